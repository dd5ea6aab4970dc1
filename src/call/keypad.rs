//! In-band keypad prompts
//!
//! Automated phone menus say things like "press 1 for claims". When the
//! transcript carries such a prompt the bridge answers with a signal tone on
//! the call instead of speech.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static PRESS_PROMPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bpress\s+(zero|one|two|three|four|five|six|seven|eight|nine|star|pound|[0-9#*])\b")
        .unwrap_or_else(|e| panic!("invalid keypad pattern: {e}"))
});

fn digit_for(word: &str) -> Option<&'static str> {
    Some(match word {
        "zero" | "0" => "0",
        "one" | "1" => "1",
        "two" | "2" => "2",
        "three" | "3" => "3",
        "four" | "4" => "4",
        "five" | "5" => "5",
        "six" | "6" => "6",
        "seven" | "7" => "7",
        "eight" | "8" => "8",
        "nine" | "9" => "9",
        "star" | "*" => "*",
        "pound" | "#" => "#",
        _ => return None,
    })
}

/// Detects keypad prompts the bridge should answer
///
/// Only configured digits are answered, and each at most once per speaking
/// turn since interim results repeat the same words.
#[derive(Debug)]
pub struct KeypadDetector {
    answer: HashSet<String>,
    sent_this_turn: HashSet<String>,
}

impl Default for KeypadDetector {
    fn default() -> Self {
        Self::new(["1"])
    }
}

impl KeypadDetector {
    /// Create a detector answering the given digits
    pub fn new<I, S>(digits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answer: digits.into_iter().map(Into::into).collect(),
            sent_this_turn: HashSet::new(),
        }
    }

    /// Digits to send for this text, if any and not yet sent this turn
    pub fn detect(&mut self, text: &str) -> Option<String> {
        let normalized = text.to_lowercase();

        for captures in PRESS_PROMPT.captures_iter(&normalized) {
            let Some(digit) = captures.get(1).and_then(|m| digit_for(m.as_str())) else {
                continue;
            };
            if !self.answer.contains(digit) {
                continue;
            }
            if self.sent_this_turn.insert(digit.to_string()) {
                tracing::info!(digit, "detected keypad prompt");
                return Some(digit.to_string());
            }
        }

        None
    }

    /// Forget what was sent; called when an utterance is finalized
    pub fn end_turn(&mut self) {
        self.sent_this_turn.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_spelled_and_numeric_digits() {
        let mut detector = KeypadDetector::default();
        assert_eq!(detector.detect("For claims, Press One."), Some("1".to_string()));

        let mut detector = KeypadDetector::default();
        assert_eq!(detector.detect("please press 1 now"), Some("1".to_string()));
    }

    #[test]
    fn test_ignores_unconfigured_digits() {
        let mut detector = KeypadDetector::default();
        assert_eq!(detector.detect("press two for pharmacy"), None);

        let mut detector = KeypadDetector::new(["1", "2"]);
        assert_eq!(detector.detect("press two for pharmacy"), Some("2".to_string()));
    }

    #[test]
    fn test_does_not_match_inside_words() {
        let mut detector = KeypadDetector::default();
        assert_eq!(detector.detect("the pressone account"), None);
        assert_eq!(detector.detect("press 10 times"), None);
    }

    #[test]
    fn test_sends_once_per_turn() {
        let mut detector = KeypadDetector::default();
        assert!(detector.detect("press one").is_some());
        assert!(detector.detect("press one for claims").is_none());

        detector.end_turn();
        assert!(detector.detect("press one").is_some());
    }
}
