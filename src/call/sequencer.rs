//! Ordered, interruptible playback of synthesized segments
//!
//! Synthesis requests for the segments of a reply run concurrently and finish
//! in any order. The sequencer buffers each result under its
//! [`SegmentKey`] and releases audio strictly in key order: a result for the
//! expected key goes out at once and drains every buffered successor, a later
//! key waits in the buffer, and an earlier key is stale and dropped.
//!
//! Every released chunk is followed by a mark. Marks stay outstanding until the
//! far end acknowledges them; while any are outstanding, caller speech triggers
//! a barge-in that clears playback and supersedes the turns in flight.

use std::collections::BTreeMap;

use indexmap::IndexSet;

use super::{PlaybackItem, SegmentKey};

/// Instruction for the outbound audio sink
#[derive(Clone, PartialEq, Eq)]
pub enum PlaybackCommand {
    /// Send an audio chunk
    Media { key: SegmentKey, audio: Vec<u8> },
    /// Request an acknowledgement once the preceding chunk has played
    Mark { label: String },
    /// Flush everything queued or playing
    Clear,
}

impl std::fmt::Debug for PlaybackCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Media { key, audio } => write!(f, "Media({key}, {} bytes)", audio.len()),
            Self::Mark { label } => write!(f, "Mark({label})"),
            Self::Clear => f.write_str("Clear"),
        }
    }
}

/// Marks sent but not yet acknowledged, in send order
#[derive(Debug, Default)]
pub struct OutstandingMarks {
    labels: IndexSet<String>,
}

impl OutstandingMarks {
    pub fn push(&mut self, label: String) {
        self.labels.insert(label);
    }

    /// Remove a label by value
    ///
    /// Returns `false` if the label was not outstanding.
    pub fn acknowledge(&mut self, label: &str) -> bool {
        self.labels.shift_remove(label)
    }

    /// Drop every outstanding label, returning how many there were
    pub fn clear(&mut self) -> usize {
        let count = self.labels.len();
        self.labels.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// Reorders synthesis results into one strictly ordered outbound stream
#[derive(Debug, Default)]
pub struct PlaybackSequencer {
    expected: SegmentKey,
    pending: BTreeMap<SegmentKey, PlaybackItem>,
    turn_lengths: BTreeMap<u32, u32>,
    latest_turn: Option<u32>,
    marks: OutstandingMarks,
}

impl PlaybackSequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key the sequencer will release next
    #[must_use]
    pub const fn expected(&self) -> SegmentKey {
        self.expected
    }

    #[must_use]
    pub const fn marks(&self) -> &OutstandingMarks {
        &self.marks
    }

    /// Number of buffered results waiting on a predecessor
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Start a new turn, superseding every earlier one
    ///
    /// Buffered results of earlier turns are discarded and their late
    /// completions become stale.
    pub fn begin_turn(&mut self, turn: u32) -> Vec<PlaybackCommand> {
        self.latest_turn = Some(self.latest_turn.map_or(turn, |t| t.max(turn)));

        let start = SegmentKey::new(turn, 0);
        if start > self.expected {
            let dropped = self.pending.len();
            self.pending.retain(|key, _| *key >= start);
            self.turn_lengths.retain(|t, _| *t >= turn);
            tracing::debug!(
                from = %self.expected,
                to = %start,
                dropped = dropped - self.pending.len(),
                "turn superseded earlier playback"
            );
            self.expected = start;
        }

        let mut commands = Vec::new();
        self.drain(&mut commands);
        commands
    }

    /// Record how many segments a turn produced
    ///
    /// Once every one of them has been released the sequencer rolls over to
    /// the first segment of the next turn.
    pub fn finish_turn(&mut self, turn: u32, segments: u32) -> Vec<PlaybackCommand> {
        if turn < self.expected.turn {
            return Vec::new();
        }

        self.turn_lengths.insert(turn, segments);

        let mut commands = Vec::new();
        self.drain(&mut commands);
        commands
    }

    /// Accept a synthesis result
    pub fn submit(&mut self, key: SegmentKey, item: PlaybackItem) -> Vec<PlaybackCommand> {
        if key < self.expected {
            tracing::debug!(%key, expected = %self.expected, "discarding stale segment");
            return Vec::new();
        }

        if key > self.expected {
            tracing::debug!(%key, expected = %self.expected, "buffering out-of-order segment");
            self.pending.entry(key).or_insert(item);
            return Vec::new();
        }

        let mut commands = Vec::new();
        self.release(key, item, &mut commands);
        self.drain(&mut commands);
        commands
    }

    /// Remove an acknowledged mark
    pub fn acknowledge(&mut self, label: &str) -> bool {
        let known = self.marks.acknowledge(label);
        if !known {
            tracing::debug!(label, "acknowledgement for unknown mark");
        }
        known
    }

    /// Barge-in: caller speech while audio is queued or playing
    ///
    /// With marks outstanding this clears the sink, forgets the marks, drops
    /// every buffered result and supersedes all turns begun so far. Without
    /// outstanding marks nothing is playing and this is a no-op.
    pub fn interrupt(&mut self) -> Vec<PlaybackCommand> {
        if self.marks.is_empty() {
            return Vec::new();
        }

        let cleared = self.marks.clear();
        let dropped = self.pending.len();
        self.pending.clear();

        if let Some(latest) = self.latest_turn {
            let next = SegmentKey::new(latest + 1, 0);
            if next > self.expected {
                self.expected = next;
            }
        }
        self.turn_lengths.retain(|t, _| *t >= self.expected.turn);

        tracing::info!(
            marks = cleared,
            dropped,
            expected = %self.expected,
            "barge-in, clearing playback"
        );

        vec![PlaybackCommand::Clear]
    }

    fn release(&mut self, key: SegmentKey, item: PlaybackItem, commands: &mut Vec<PlaybackCommand>) {
        match item {
            PlaybackItem::Audio(audio) => {
                let label = uuid::Uuid::new_v4().to_string();
                tracing::debug!(%key, bytes = audio.len(), %label, "releasing segment");
                commands.push(PlaybackCommand::Media { key, audio });
                commands.push(PlaybackCommand::Mark {
                    label: label.clone(),
                });
                self.marks.push(label);
            }
            PlaybackItem::Skip => {
                tracing::debug!(%key, "skipping segment without audio");
            }
        }
        self.expected = key.next_segment();
    }

    fn drain(&mut self, commands: &mut Vec<PlaybackCommand>) {
        loop {
            self.roll_over();
            let key = self.expected;
            match self.pending.remove(&key) {
                Some(item) => self.release(key, item, commands),
                None => break,
            }
        }
    }

    fn roll_over(&mut self) {
        while let Some(&len) = self.turn_lengths.get(&self.expected.turn) {
            if self.expected.segment < len {
                break;
            }
            self.turn_lengths.remove(&self.expected.turn);
            self.expected = self.expected.next_turn();
        }
    }
}
