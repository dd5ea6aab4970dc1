//! Sentence segmentation of streamed completions
//!
//! Tokens arrive a few characters at a time. A segment is emitted as soon as
//! a sentence boundary is followed by whitespace, so synthesis of the first
//! sentence starts while the model is still writing the rest.

use futures::StreamExt;

use super::{ChatMessage, Segment, SegmentKey};
use crate::providers::CompletionModel;

/// Characters that may trail a sentence terminator before the boundary
fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '\u{201D}' | '\u{2019}')
}

/// Byte offset just past the first complete sentence in `text`
///
/// A terminator at the very end of the buffer is not yet a boundary since
/// the next token may continue it ("3." then "5").
fn sentence_end(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '\n' {
            return Some(i + 1);
        }
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !is_closing(next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }

        if chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
            return Some(end);
        }
    }

    None
}

/// Splits one turn's token stream into ordered segments
#[derive(Debug)]
pub struct Segmenter {
    turn: u32,
    next_index: u32,
    buffer: String,
    spoken: Vec<String>,
}

impl Segmenter {
    #[must_use]
    pub const fn new(turn: u32) -> Self {
        Self {
            turn,
            next_index: 0,
            buffer: String::new(),
            spoken: Vec::new(),
        }
    }

    /// Append a token and return every segment it completed
    pub fn push(&mut self, token: &str) -> Vec<Segment> {
        self.buffer.push_str(token);

        let mut segments = Vec::new();
        while let Some(end) = sentence_end(&self.buffer) {
            let rest = self.buffer.split_off(end);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            segments.extend(self.emit(&sentence));
        }
        segments
    }

    /// Flush whatever remains once the stream has ended cleanly
    pub fn finish(&mut self) -> Option<Segment> {
        let rest = std::mem::take(&mut self.buffer);
        self.emit(&rest)
    }

    /// Drop the unfinished remainder
    pub fn abandon(&mut self) -> usize {
        let dropped = self.buffer.trim().len();
        self.buffer.clear();
        dropped
    }

    /// Segments emitted so far
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.next_index
    }

    /// Text of every emitted segment, space-joined
    #[must_use]
    pub fn reply(&self) -> String {
        self.spoken.join(" ")
    }

    fn emit(&mut self, text: &str) -> Option<Segment> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let key = SegmentKey::new(self.turn, self.next_index);
        self.next_index += 1;
        self.spoken.push(text.to_string());

        Some(Segment {
            key,
            text: text.to_string(),
        })
    }
}

/// How a completion turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub turn: u32,
    /// Number of segments dispatched for synthesis
    pub segments: u32,
    /// What was actually handed to synthesis
    pub reply: String,
    /// False when the completion failed to open or broke off mid-stream
    pub completed: bool,
}

/// Run one completion turn, handing each segment to `on_segment` as soon as
/// it is complete
///
/// Completion failures never propagate: a stream that fails to open yields
/// zero segments, and one that breaks off mid-reply keeps the segments
/// already dispatched and drops the unfinished sentence.
pub async fn generate_turn<F>(
    model: &dyn CompletionModel,
    messages: Vec<ChatMessage>,
    turn: u32,
    mut on_segment: F,
) -> TurnOutcome
where
    F: FnMut(Segment),
{
    let mut segmenter = Segmenter::new(turn);

    let completed = match model.stream_completion(messages).await {
        Ok(mut stream) => {
            let mut completed = true;
            while let Some(token) = stream.next().await {
                match token {
                    Ok(token) => segmenter.push(&token).into_iter().for_each(&mut on_segment),
                    Err(e) => {
                        let dropped = segmenter.abandon();
                        tracing::error!(turn, error = %e, dropped, "completion stream broke off");
                        completed = false;
                        break;
                    }
                }
            }
            if completed {
                if let Some(segment) = segmenter.finish() {
                    on_segment(segment);
                }
            }
            completed
        }
        Err(e) => {
            tracing::error!(turn, error = %e, "failed to open completion stream");
            false
        }
    };

    tracing::debug!(turn, segments = segmenter.count(), completed, "completion turn done");

    TurnOutcome {
        turn,
        segments: segmenter.count(),
        reply: segmenter.reply(),
        completed,
    }
}
