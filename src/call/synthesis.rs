//! Concurrent speech synthesis
//!
//! Every segment is synthesized in its own task the moment it exists, so
//! results complete in any order. The playback sequencer restores order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{PlaybackItem, Segment, SessionEvent};
use crate::providers::SpeechSynthesizer;

/// Dispatches segments to the synthesizer and reports results to the session
#[derive(Clone)]
pub struct SynthesisFanout {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SynthesisFanout {
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            synthesizer,
            events,
        }
    }

    /// Start synthesizing one segment
    ///
    /// Exactly one [`SessionEvent::Synthesized`] is reported per segment. A
    /// failed or empty synthesis reports [`PlaybackItem::Skip`] so playback
    /// can move past the key.
    pub fn dispatch(&self, segment: Segment) -> JoinHandle<()> {
        let synthesizer = Arc::clone(&self.synthesizer);
        let events = self.events.clone();

        tokio::spawn(
            async move {
                let Segment { key, text } = segment;

                let item = if text.trim().is_empty() {
                    PlaybackItem::Skip
                } else {
                    match synthesizer.synthesize(&text).await {
                        Ok(audio) if !audio.is_empty() => {
                            tracing::debug!(%key, bytes = audio.len(), "segment synthesized");
                            PlaybackItem::Audio(audio)
                        }
                        Ok(_) => {
                            tracing::warn!(%key, "synthesizer returned no audio");
                            PlaybackItem::Skip
                        }
                        Err(e) => {
                            tracing::error!(%key, error = %e, "synthesis failed, skipping segment");
                            PlaybackItem::Skip
                        }
                    }
                };

                // session gone means the call ended
                let _ = events.send(SessionEvent::Synthesized { key, item });
            }
            .instrument(tracing::Span::current()),
        )
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::call::SegmentKey;
    use crate::{Error, Result};

    struct EchoSynth;

    #[async_trait]
    impl SpeechSynthesizer for EchoSynth {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
            if text.contains("fail") {
                return Err(Error::Tts("boom".to_string()));
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    fn segment(segment: u32, text: &str) -> Segment {
        Segment {
            key: SegmentKey::new(1, segment),
            text: text.to_string(),
        }
    }

    async fn dispatch_one(text: &str) -> SessionEvent {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fanout = SynthesisFanout::new(Arc::new(EchoSynth), tx);
        fanout.dispatch(segment(0, text)).await.unwrap();
        rx.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_reports_audio() {
        match dispatch_one("hello").await {
            SessionEvent::Synthesized { key, item } => {
                assert_eq!(key, SegmentKey::new(1, 0));
                assert_eq!(item, PlaybackItem::Audio(b"hello".to_vec()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_reports_skip() {
        match dispatch_one("please fail").await {
            SessionEvent::Synthesized { item, .. } => assert_eq!(item, PlaybackItem::Skip),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_text_reports_skip_without_calling_synthesizer() {
        match dispatch_one("   ").await {
            SessionEvent::Synthesized { item, .. } => assert_eq!(item, PlaybackItem::Skip),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
