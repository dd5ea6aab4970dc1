//! Deepgram live transcription over WebSocket

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::Instrument;
use url::Url;

use super::{StreamOptions, Transcriber, TranscriptionStream};
use crate::call::RecognitionEvent;
use crate::config::TranscriptionConfig;
use crate::{Error, Result};

const LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Sent when the caller's audio ends so Deepgram flushes and closes
const CLOSE_STREAM: &str = r#"{"type":"CloseStream"}"#;

/// Buffered caller audio chunks (20 ms each) before backpressure
const AUDIO_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ListenMessage {
    Results {
        channel: ResultChannel,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        speech_final: bool,
    },
    UtteranceEnd {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResultChannel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
}

/// Map one Deepgram text message to a recognition event
///
/// Metadata, `SpeechStarted` and other housekeeping messages map to `None`.
fn parse_message(text: &str) -> Result<Option<RecognitionEvent>> {
    let message: ListenMessage = serde_json::from_str(text)?;

    Ok(match message {
        ListenMessage::Results {
            channel,
            is_final,
            speech_final,
        } => {
            let text = channel
                .alternatives
                .into_iter()
                .next()
                .map(|alt| alt.transcript)
                .unwrap_or_default();
            Some(RecognitionEvent {
                text,
                is_final,
                is_end_of_speech: speech_final,
            })
        }
        ListenMessage::UtteranceEnd {} => Some(RecognitionEvent::end_of_speech("")),
        ListenMessage::Other => None,
    })
}

/// Streaming transcriber backed by Deepgram's live API
pub struct DeepgramTranscriber {
    api_key: SecretString,
    model: String,
    endpointing_ms: u32,
    utterance_end_ms: u32,
}

impl DeepgramTranscriber {
    /// Create a transcriber from config
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("Deepgram API key required for transcription".to_string()))?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            endpointing_ms: config.endpointing_ms,
            utterance_end_ms: config.utterance_end_ms,
        })
    }

    fn listen_url(&self, options: &StreamOptions) -> Result<Url> {
        let mut url =
            Url::parse(LISTEN_URL).map_err(|e| Error::Stt(format!("invalid listen URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("model", &self.model)
            .append_pair("encoding", &options.encoding)
            .append_pair("sample_rate", &options.sample_rate.to_string())
            .append_pair("channels", "1")
            .append_pair("punctuate", "true")
            .append_pair("interim_results", "true")
            .append_pair("endpointing", &self.endpointing_ms.to_string())
            .append_pair("utterance_end_ms", &self.utterance_end_ms.to_string());

        Ok(url)
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn open(&self, options: &StreamOptions) -> Result<TranscriptionStream> {
        let url = self.listen_url(options)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Stt(format!("invalid listen request: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key.expose_secret()))
            .map_err(|e| Error::Stt(format!("invalid API key header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| Error::Stt(format!("failed to connect to Deepgram: {e}")))?;
        tracing::info!(model = %self.model, "connected to Deepgram");

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(64);

        tokio::spawn(
            async move {
                let (mut sink, mut stream) = socket.split();

                loop {
                    tokio::select! {
                        chunk = audio_rx.recv() => {
                            let Some(chunk) = chunk else {
                                let _ = sink.send(Message::Text(CLOSE_STREAM.into())).await;
                                tracing::debug!("caller audio ended, closing transcription");
                                break;
                            };
                            if let Err(e) = sink.send(Message::Binary(chunk.into())).await {
                                let _ = events_tx
                                    .send(Err(Error::Stt(format!("failed to send audio: {e}"))))
                                    .await;
                                break;
                            }
                        }
                        message = stream.next() => match message {
                            Some(Ok(Message::Text(text))) => match parse_message(text.as_str()) {
                                Ok(Some(event)) => {
                                    if events_tx.send(Ok(event)).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => tracing::warn!(error = %e, "unparseable Deepgram message"),
                            },
                            Some(Ok(Message::Close(frame))) => {
                                tracing::info!(frame = ?frame, "Deepgram closed the connection");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                let _ = events_tx
                                    .send(Err(Error::Stt(format!("Deepgram socket error: {e}"))))
                                    .await;
                                break;
                            }
                            None => break,
                        },
                    }
                }
            }
            .instrument(tracing::Span::current()),
        );

        Ok(TranscriptionStream {
            audio: audio_tx,
            events: events_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcriber() -> DeepgramTranscriber {
        DeepgramTranscriber {
            api_key: SecretString::from("dg-key"),
            model: "nova-2".to_string(),
            endpointing_ms: 500,
            utterance_end_ms: 1500,
        }
    }

    #[test]
    fn test_listen_url_requests_interim_mulaw() {
        let url = transcriber().listen_url(&StreamOptions::default()).unwrap();
        let query = url.query().unwrap();

        assert!(query.contains("model=nova-2"));
        assert!(query.contains("encoding=mulaw"));
        assert!(query.contains("sample_rate=8000"));
        assert!(query.contains("interim_results=true"));
        assert!(query.contains("utterance_end_ms=1500"));
    }

    #[test]
    fn test_parse_results_message() {
        let event = parse_message(
            r#"{"type":"Results","is_final":true,"speech_final":true,
                "channel":{"alternatives":[{"transcript":"what is my deductible","confidence":0.98}]}}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(event, RecognitionEvent::end_of_speech("what is my deductible"));
    }

    #[test]
    fn test_parse_interim_without_flags() {
        let event = parse_message(
            r#"{"type":"Results","channel":{"alternatives":[{"transcript":"wait"}]}}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(event, RecognitionEvent::interim("wait"));
    }

    #[test]
    fn test_parse_utterance_end() {
        let event = parse_message(r#"{"type":"UtteranceEnd","last_word_end":2.4}"#)
            .unwrap()
            .unwrap();
        assert!(event.is_end_of_speech);
        assert!(event.text.is_empty());
    }

    #[test]
    fn test_housekeeping_messages_are_ignored() {
        assert!(parse_message(r#"{"type":"Metadata","request_id":"r1"}"#).unwrap().is_none());
        assert!(parse_message(r#"{"type":"SpeechStarted"}"#).unwrap().is_none());
        assert!(parse_message("not json").is_err());
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = TranscriptionConfig {
            api_key: None,
            model: "nova-2".to_string(),
            endpointing_ms: 500,
            utterance_end_ms: 1500,
        };
        assert!(matches!(
            DeepgramTranscriber::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
