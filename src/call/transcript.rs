//! Transcript finalization
//!
//! Turns the raw recognition stream of one call into interim-speech signals
//! and at most one finalized utterance per speaking turn.
//!
//! Three triggers can close an utterance:
//! - a final chunk carrying the provider's end-of-speech marker
//! - a run of empty results after speech (the provider went quiet)
//! - the inactivity deadline, re-armed by every recognition event
//!
//! Whichever fires first wins; the `finalized` guard turns the others into
//! no-ops until new speech opens the next turn.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::SessionConfig;

/// One result from the streaming recognizer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecognitionEvent {
    pub text: String,

    /// Text for this audio span will not change
    pub is_final: bool,

    /// Speaker paused, closing the utterance
    pub is_end_of_speech: bool,
}

impl RecognitionEvent {
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn final_chunk(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            is_end_of_speech: false,
        }
    }

    #[must_use]
    pub fn end_of_speech(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            is_end_of_speech: true,
        }
    }
}

/// What closed an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeTrigger {
    EndOfSpeech,
    EmptyRun,
    Timeout,
}

impl FinalizeTrigger {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EndOfSpeech => "end_of_speech",
            Self::EmptyRun => "empty_run",
            Self::Timeout => "timeout",
        }
    }
}

/// Output of the finalizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptSignal {
    /// Caller is speaking (non-trivial interim text)
    InterimSpeech(String),
    /// Caller finished an utterance
    Utterance {
        text: String,
        trigger: FinalizeTrigger,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    Idle,
    Accumulating,
}

/// Per-call transcript state machine
#[derive(Debug)]
pub struct TranscriptFinalizer {
    buffer: String,
    finalized: bool,
    empty_run: u32,
    heard_speech: bool,
    last_activity: Option<Instant>,
    deadline: Option<Instant>,
    speech_timeout: Duration,
    empty_threshold: u32,
    min_interim_chars: usize,
}

impl TranscriptFinalizer {
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            buffer: String::new(),
            finalized: false,
            empty_run: 0,
            heard_speech: false,
            last_activity: None,
            deadline: None,
            speech_timeout: config.speech_timeout,
            empty_threshold: config.empty_transcript_threshold.max(1),
            min_interim_chars: config.barge_in_min_chars.max(1),
        }
    }

    #[must_use]
    pub const fn state(&self) -> FinalizerState {
        if self.heard_speech {
            FinalizerState::Accumulating
        } else {
            FinalizerState::Idle
        }
    }

    /// When the inactivity fallback fires, if armed
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    /// Accumulated final text not yet emitted
    #[must_use]
    pub fn buffered(&self) -> &str {
        self.buffer.trim()
    }

    /// Feed one recognition event
    pub fn ingest(&mut self, event: &RecognitionEvent, now: Instant) -> Vec<TranscriptSignal> {
        self.last_activity = Some(now);
        self.deadline = Some(now + self.speech_timeout);

        let text = event.text.trim();
        let mut signals = Vec::new();

        if text.is_empty() {
            if event.is_end_of_speech {
                signals.extend(self.finalize(FinalizeTrigger::EndOfSpeech));
            } else if self.heard_speech {
                self.empty_run += 1;
                if self.empty_run >= self.empty_threshold {
                    tracing::warn!(
                        empty_run = self.empty_run,
                        "speech stalled with empty transcripts"
                    );
                    signals.extend(self.finalize(FinalizeTrigger::EmptyRun));
                }
            }
            return signals;
        }

        self.empty_run = 0;
        self.heard_speech = true;
        self.finalized = false;

        if event.is_final {
            self.buffer.push(' ');
            self.buffer.push_str(text);

            if event.is_end_of_speech {
                signals.extend(self.finalize(FinalizeTrigger::EndOfSpeech));
            }
        } else if text.chars().count() >= self.min_interim_chars {
            signals.push(TranscriptSignal::InterimSpeech(text.to_string()));
        }

        signals
    }

    /// Fire the inactivity fallback if its deadline has passed
    pub fn on_timeout(&mut self, now: Instant) -> Option<TranscriptSignal> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                tracing::debug!("speech inactivity deadline reached");
                self.finalize(FinalizeTrigger::Timeout)
            }
            _ => None,
        }
    }

    /// Drop all state and disarm the deadline
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.finalized = false;
        self.empty_run = 0;
        self.heard_speech = false;
        self.deadline = None;
    }

    fn finalize(&mut self, trigger: FinalizeTrigger) -> Option<TranscriptSignal> {
        if self.finalized {
            return None;
        }

        let text = self.buffer.trim().to_string();
        if text.is_empty() {
            return None;
        }

        tracing::info!(trigger = trigger.as_str(), utterance = %text, "utterance finalized");

        self.buffer.clear();
        self.finalized = true;
        self.heard_speech = false;
        self.empty_run = 0;
        self.deadline = None;

        Some(TranscriptSignal::Utterance { text, trigger })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalizer() -> TranscriptFinalizer {
        TranscriptFinalizer::new(&SessionConfig::default())
    }

    fn utterances(signals: &[TranscriptSignal]) -> Vec<&str> {
        signals
            .iter()
            .filter_map(|s| match s {
                TranscriptSignal::Utterance { text, .. } => Some(text.as_str()),
                TranscriptSignal::InterimSpeech(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_end_of_speech_emits_accumulated_text() {
        let mut f = finalizer();
        let now = Instant::now();

        assert!(f.ingest(&RecognitionEvent::final_chunk("what is"), now).is_empty());
        assert_eq!(f.state(), FinalizerState::Accumulating);

        let out = f.ingest(&RecognitionEvent::end_of_speech("my deductible"), now);
        assert_eq!(
            out,
            vec![TranscriptSignal::Utterance {
                text: "what is my deductible".to_string(),
                trigger: FinalizeTrigger::EndOfSpeech,
            }]
        );
        assert_eq!(f.state(), FinalizerState::Idle);
        assert_eq!(f.buffered(), "");
    }

    #[test]
    fn test_interim_text_signals_speech() {
        let mut f = finalizer();
        let out = f.ingest(&RecognitionEvent::interim("wait"), Instant::now());
        assert_eq!(out, vec![TranscriptSignal::InterimSpeech("wait".to_string())]);
    }

    #[test]
    fn test_interim_below_minimum_is_silent() {
        let config = SessionConfig {
            barge_in_min_chars: 6,
            ..SessionConfig::default()
        };
        let mut f = TranscriptFinalizer::new(&config);
        assert!(f.ingest(&RecognitionEvent::interim("uh"), Instant::now()).is_empty());
        assert_eq!(f.ingest(&RecognitionEvent::interim("hold on please"), Instant::now()).len(), 1);
    }

    #[test]
    fn test_empty_run_forces_finalization() {
        let mut f = finalizer();
        let now = Instant::now();
        f.ingest(&RecognitionEvent::final_chunk("member id is 42"), now);

        assert!(f.ingest(&RecognitionEvent::final_chunk(""), now).is_empty());
        assert!(f.ingest(&RecognitionEvent::interim(" "), now).is_empty());
        let out = f.ingest(&RecognitionEvent::final_chunk(""), now);

        assert_eq!(
            out,
            vec![TranscriptSignal::Utterance {
                text: "member id is 42".to_string(),
                trigger: FinalizeTrigger::EmptyRun,
            }]
        );
    }

    #[test]
    fn test_non_empty_text_resets_empty_run() {
        let mut f = finalizer();
        let now = Instant::now();
        f.ingest(&RecognitionEvent::final_chunk("one"), now);
        f.ingest(&RecognitionEvent::final_chunk(""), now);
        f.ingest(&RecognitionEvent::final_chunk(""), now);
        f.ingest(&RecognitionEvent::interim("two"), now);
        assert!(f.ingest(&RecognitionEvent::final_chunk(""), now).is_empty());
        assert!(f.ingest(&RecognitionEvent::final_chunk(""), now).is_empty());
    }

    #[test]
    fn test_only_empty_input_never_finalizes() {
        let mut f = finalizer();
        let start = Instant::now();
        for i in 0..20 {
            let now = start + Duration::from_millis(i * 100);
            assert!(f.ingest(&RecognitionEvent::final_chunk(""), now).is_empty());
        }
        assert!(f.on_timeout(start + Duration::from_secs(60)).is_none());
        assert_eq!(f.state(), FinalizerState::Idle);
    }

    #[test]
    fn test_timeout_forces_finalization() {
        let mut f = finalizer();
        let now = Instant::now();
        f.ingest(&RecognitionEvent::final_chunk("i need a copay amount"), now);

        assert!(f.on_timeout(now + Duration::from_millis(1999)).is_none());
        let out = f.on_timeout(now + Duration::from_millis(2000));
        assert_eq!(
            out,
            Some(TranscriptSignal::Utterance {
                text: "i need a copay amount".to_string(),
                trigger: FinalizeTrigger::Timeout,
            })
        );
        assert!(f.deadline().is_none());
    }

    #[test]
    fn test_each_event_rearms_deadline() {
        let mut f = finalizer();
        let start = Instant::now();
        f.ingest(&RecognitionEvent::final_chunk("hello"), start);
        let later = start + Duration::from_millis(1500);
        f.ingest(&RecognitionEvent::interim("hello th"), later);

        assert_eq!(f.deadline(), Some(later + Duration::from_secs(2)));
        assert_eq!(f.last_activity(), Some(later));
        assert!(f.on_timeout(start + Duration::from_millis(2500)).is_none());
    }

    #[test]
    fn test_racing_triggers_emit_exactly_once() {
        let mut f = finalizer();
        let now = Instant::now();
        let mut emitted = Vec::new();

        emitted.extend(f.ingest(&RecognitionEvent::final_chunk("press one for claims"), now));
        emitted.extend(f.ingest(&RecognitionEvent::final_chunk(""), now));
        emitted.extend(f.ingest(&RecognitionEvent::final_chunk(""), now));
        emitted.extend(f.ingest(&RecognitionEvent::end_of_speech(""), now));
        emitted.extend(f.ingest(&RecognitionEvent::final_chunk(""), now));
        emitted.extend(f.on_timeout(now + Duration::from_secs(5)));

        assert_eq!(utterances(&emitted), vec!["press one for claims"]);
    }

    #[test]
    fn test_timeout_after_end_of_speech_is_noop() {
        let mut f = finalizer();
        let now = Instant::now();
        let first = f.ingest(&RecognitionEvent::end_of_speech("yes"), now);
        assert_eq!(utterances(&first), vec!["yes"]);

        // An empty result re-arms the deadline, but the turn is already closed
        f.ingest(&RecognitionEvent::final_chunk(""), now);
        assert!(f.on_timeout(now + Duration::from_secs(3)).is_none());
    }

    #[test]
    fn test_next_turn_finalizes_again() {
        let mut f = finalizer();
        let now = Instant::now();
        assert_eq!(utterances(&f.ingest(&RecognitionEvent::end_of_speech("first"), now)), vec!["first"]);
        assert_eq!(utterances(&f.ingest(&RecognitionEvent::end_of_speech("second"), now)), vec!["second"]);
    }

    #[test]
    fn test_reset_disarms_deadline() {
        let mut f = finalizer();
        let now = Instant::now();
        f.ingest(&RecognitionEvent::final_chunk("partial"), now);
        f.reset();
        assert!(f.deadline().is_none());
        assert!(f.on_timeout(now + Duration::from_secs(10)).is_none());
    }
}
