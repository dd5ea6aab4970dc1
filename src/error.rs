//! Error types for the dialogue bridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the dialogue bridge
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model completion error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Telephony call-control error
    #[error("telephony error: {0}")]
    Telephony(String),

    /// Malformed or unexpected media-stream frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Call-initiation request rejected
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Outbound channel closed (session torn down)
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Base64 decoding error
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}
