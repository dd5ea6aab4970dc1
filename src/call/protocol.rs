//! Duplex media-stream wire protocol
//!
//! JSON frames exchanged with the telephony provider over the media
//! WebSocket. Every frame carries an `event` tag.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Frame received from the telephony provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundFrame {
    /// Socket handshake; carries no call data
    Connected {},
    /// Stream metadata, begins a session
    Start { start: StartMetadata },
    /// One chunk of caller audio
    Media { media: InboundMedia },
    /// Playback of a previously sent mark finished
    Mark {
        mark: MarkName,
        #[serde(rename = "sequenceNumber", default)]
        sequence_number: Option<String>,
    },
    /// Keypad digit pressed by the far end
    Dtmf { dtmf: DtmfDigit },
    /// Stream ended
    Stop {},
}

/// Metadata carried by the `start` frame
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartMetadata {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

/// Base64 μ-law 8 kHz audio payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMedia {
    pub payload: String,
}

/// Mark label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkName {
    pub name: String,
}

/// Keypad digit
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DtmfDigit {
    pub digit: String,
}

/// Outbound media payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Frame sent to the telephony provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Queue an audio chunk for playback
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Ask for an acknowledgement once everything queued before it has played
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkName,
    },
    /// Flush all queued and playing audio
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Parse one inbound text frame
///
/// # Errors
///
/// Returns `Error::Protocol` for unparseable JSON or an unknown `event`
pub fn parse_frame(text: &str) -> Result<InboundFrame> {
    serde_json::from_str(text).map_err(|e| Error::Protocol(format!("invalid frame: {e}")))
}
