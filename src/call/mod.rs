//! Per-call dialogue core
//!
//! One [`Session`] per phone call wires the components together:
//!
//! ```text
//! media ──▶ Transcriber ──▶ TranscriptFinalizer ──▶ completion (Segmenter)
//!                                 │                        │
//!                           interim speech            segments
//!                                 │                        ▼
//!                                 │                 synthesis fan-out
//!                                 ▼                        │
//!                          PlaybackSequencer ◀─────────────┘
//!                                 │
//!                                 ▼
//!                      media / mark / clear frames
//! ```
//!
//! All ordering-critical state lives inside the session's single event loop.

mod history;
mod keypad;
pub mod protocol;
mod registry;
mod segmenter;
mod sequencer;
mod session;
mod synthesis;
mod transcript;

pub use history::{ChatMessage, ChatRole, Conversation};
pub use keypad::KeypadDetector;
pub use registry::{CallBrief, CallRegistry};
pub use segmenter::{Segmenter, TurnOutcome, generate_turn};
pub use sequencer::{OutstandingMarks, PlaybackCommand, PlaybackSequencer};
pub use session::{Session, SessionEvent};
pub use synthesis::SynthesisFanout;
pub use transcript::{
    FinalizeTrigger, FinalizerState, RecognitionEvent, TranscriptFinalizer, TranscriptSignal,
};

use std::fmt;

/// Position of a segment in the outbound stream, ordered `(turn, segment)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SegmentKey {
    pub turn: u32,
    pub segment: u32,
}

impl SegmentKey {
    #[must_use]
    pub const fn new(turn: u32, segment: u32) -> Self {
        Self { turn, segment }
    }

    /// The key after this one within the same turn
    #[must_use]
    pub const fn next_segment(self) -> Self {
        Self::new(self.turn, self.segment + 1)
    }

    /// The first key of the following turn
    #[must_use]
    pub const fn next_turn(self) -> Self {
        Self::new(self.turn + 1, 0)
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.turn, self.segment)
    }
}

/// One sentence-sized slice of a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub key: SegmentKey,
    pub text: String,
}

/// Synthesis outcome for one segment
#[derive(Clone, PartialEq, Eq)]
pub enum PlaybackItem {
    /// μ-law 8 kHz audio bytes
    Audio(Vec<u8>),
    /// Synthesis failed for good; advance past this key without audio
    Skip,
}

impl fmt::Debug for PlaybackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio(bytes) => write!(f, "Audio({} bytes)", bytes.len()),
            Self::Skip => f.write_str("Skip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_key_ordering_is_lexicographic() {
        assert!(SegmentKey::new(0, 5) < SegmentKey::new(1, 0));
        assert!(SegmentKey::new(1, 0) < SegmentKey::new(1, 1));
        assert_eq!(SegmentKey::new(2, 3).next_segment(), SegmentKey::new(2, 4));
        assert_eq!(SegmentKey::new(2, 3).next_turn(), SegmentKey::new(3, 0));
    }

    #[test]
    fn test_playback_item_debug_hides_bytes() {
        assert_eq!(format!("{:?}", PlaybackItem::Audio(vec![0; 160])), "Audio(160 bytes)");
    }
}
