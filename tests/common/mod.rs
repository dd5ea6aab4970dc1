//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dialbridge::call::{ChatMessage, RecognitionEvent};
use dialbridge::config::file::BridgeConfigFile;
use dialbridge::providers::{
    CompletionModel, SpeechSynthesizer, StreamOptions, Telephony, TokenStream, Transcriber,
    TranscriptionStream,
};
use dialbridge::{Config, Error, Providers, Result};
use futures::stream;
use tokio::sync::mpsc;

/// Build a config from the given environment variables only
pub fn config_with(vars: &[(&str, &str)]) -> Config {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_sources(BridgeConfigFile::default(), |name| {
        vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    })
    .expect("test config")
}

/// Records call-control requests
#[derive(Default)]
pub struct FakeTelephony {
    pub dialed: Mutex<Vec<String>>,
    pub tones: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl Telephony for FakeTelephony {
    async fn initiate_call(&self, destination: &str) -> Result<String> {
        if self.fail {
            return Err(Error::Telephony("carrier unavailable".to_string()));
        }
        let mut dialed = self.dialed.lock().unwrap();
        dialed.push(destination.to_string());
        Ok(format!("CA-fake-{}", dialed.len()))
    }

    async fn send_signal_tone(&self, call_id: &str, digits: &str) -> Result<()> {
        self.tones
            .lock()
            .unwrap()
            .push((call_id.to_string(), digits.to_string()));
        Ok(())
    }
}

/// Test side of a fake transcription session
pub struct TranscriptionHandle {
    pub recognitions: mpsc::Sender<Result<RecognitionEvent>>,
    pub audio: mpsc::Receiver<Vec<u8>>,
}

/// Hands out one pre-built transcription stream
pub struct FakeTranscriber {
    stream: Mutex<Option<TranscriptionStream>>,
}

impl FakeTranscriber {
    pub fn new() -> (Self, TranscriptionHandle) {
        let (audio_tx, audio_rx) = mpsc::channel(256);
        let (events_tx, events_rx) = mpsc::channel(64);

        let transcriber = Self {
            stream: Mutex::new(Some(TranscriptionStream {
                audio: audio_tx,
                events: events_rx,
            })),
        };
        let handle = TranscriptionHandle {
            recognitions: events_tx,
            audio: audio_rx,
        };
        (transcriber, handle)
    }

    /// A transcriber whose open always fails
    pub fn unavailable() -> Self {
        Self {
            stream: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn open(&self, _options: &StreamOptions) -> Result<TranscriptionStream> {
        self.stream
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Stt("transcriber unavailable".to_string()))
    }
}

/// Replays scripted token lists, one per completion request
#[derive(Default)]
pub struct FakeCompletion {
    replies: Mutex<VecDeque<Vec<String>>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeCompletion {
    pub fn with_replies(replies: &[&[&str]]) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .iter()
                    .map(|tokens| tokens.iter().map(|t| (*t).to_string()).collect())
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionModel for FakeCompletion {
    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        self.requests.lock().unwrap().push(messages);
        let tokens = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Llm("no scripted reply".to_string()))?;
        Ok(Box::pin(stream::iter(tokens.into_iter().map(Ok))))
    }
}

/// Returns the text bytes as audio after a per-text delay
#[derive(Default)]
pub struct FakeSynthesizer {
    delays: Vec<(String, Duration)>,
}

impl FakeSynthesizer {
    /// Texts containing `needle` take `delay` to synthesize
    pub fn with_delays(delays: &[(&str, Duration)]) -> Self {
        Self {
            delays: delays.iter().map(|(k, d)| ((*k).to_string(), *d)).collect(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if let Some((_, delay)) = self.delays.iter().find(|(needle, _)| text.contains(needle.as_str())) {
            tokio::time::sleep(*delay).await;
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Bundle fakes into a provider set
pub fn providers(
    telephony: Arc<FakeTelephony>,
    transcriber: FakeTranscriber,
    completion: Arc<FakeCompletion>,
    synthesizer: FakeSynthesizer,
) -> Providers {
    Providers {
        telephony,
        transcriber: Arc::new(transcriber),
        completion,
        synthesizer: Arc::new(synthesizer),
    }
}
