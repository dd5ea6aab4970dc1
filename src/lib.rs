//! Dialbridge - Real-time spoken-dialogue bridge for phone calls
//!
//! This library connects a telephony media stream to streaming speech
//! recognition, a streaming language model and speech synthesis:
//! - Transcript finalization with barge-in detection
//! - Sentence segmentation of streamed completions
//! - Concurrent synthesis with strictly ordered playback
//! - Outbound call initiation and TwiML webhooks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Telephony media stream                  │
//! │        media  │  mark  │  start/stop  │  clear       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Call Session                         │
//! │  Finalizer │ Segmenter │ Fan-out │ Playback Sequencer│
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Providers                           │
//! │   Deepgram STT  │  OpenAI LLM  │  ElevenLabs TTS     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod call;
pub mod config;
pub mod error;
pub mod providers;

pub use api::{ApiServer, ApiState};
pub use call::{CallBrief, CallRegistry, Session};
pub use config::Config;
pub use error::{Error, Result};
pub use providers::Providers;
