//! External collaborators
//!
//! The call core only needs one narrow async operation from each provider.
//! Each is a trait so sessions can run against real clients or test fakes.

mod deepgram;
mod elevenlabs;
mod openai;
mod twilio;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

pub use deepgram::DeepgramTranscriber;
pub use elevenlabs::ElevenLabsSynthesizer;
pub use openai::OpenAiCompletion;
pub use twilio::TwilioClient;

use crate::call::{ChatMessage, RecognitionEvent};
use crate::{Config, Result};

/// Lazily produced completion tokens
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Telephony call control
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Dial `destination`, returning the provider's call id
    async fn initiate_call(&self, destination: &str) -> Result<String>;

    /// Play keypad tones on a live call
    async fn send_signal_tone(&self, call_id: &str, digits: &str) -> Result<()>;
}

/// Audio format of a streaming transcription session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub encoding: String,
    pub sample_rate: u32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            encoding: "mulaw".to_string(),
            sample_rate: 8000,
        }
    }
}

/// Handle to an open streaming transcription session
///
/// Dropping `audio` ends the session; `events` closes when the provider
/// connection is gone.
#[derive(Debug)]
pub struct TranscriptionStream {
    pub audio: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::Receiver<Result<RecognitionEvent>>,
}

/// Streaming speech-to-text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn open(&self, options: &StreamOptions) -> Result<TranscriptionStream>;
}

/// Streaming chat completion
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn stream_completion(&self, messages: Vec<ChatMessage>) -> Result<TokenStream>;
}

/// One-shot speech synthesis
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` to μ-law 8 kHz audio
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// The full set of collaborators a session talks to
#[derive(Clone)]
pub struct Providers {
    pub telephony: Arc<dyn Telephony>,
    pub transcriber: Arc<dyn Transcriber>,
    pub completion: Arc<dyn CompletionModel>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Providers {
    /// Build the production provider clients
    ///
    /// # Errors
    ///
    /// Returns error if a required credential is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            telephony: Arc::new(TwilioClient::from_config(config)?),
            transcriber: Arc::new(DeepgramTranscriber::from_config(&config.transcription)?),
            completion: Arc::new(OpenAiCompletion::from_config(&config.llm)?),
            synthesizer: Arc::new(ElevenLabsSynthesizer::from_config(&config.tts)?),
        })
    }
}
