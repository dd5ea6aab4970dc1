//! TOML configuration file loading
//!
//! Supports `~/.config/dialbridge/config.toml` (or `DIALBRIDGE_CONFIG`) as a
//! persistent config source. All fields are optional; the file is a partial
//! overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BridgeConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Telephony provider configuration
    #[serde(default)]
    pub telephony: TelephonyFileConfig,

    /// Streaming transcription configuration
    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Per-call session tunables
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Call-initiation rules
    #[serde(default)]
    pub calls: CallsFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP server port
    pub port: Option<u16>,

    /// Public host name the telephony provider reaches us on
    pub domain: Option<String>,

    /// API keys accepted on the call-initiation endpoint
    pub api_keys: Option<Vec<String>>,
}

/// Telephony provider configuration
#[derive(Debug, Default, Deserialize)]
pub struct TelephonyFileConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

/// Streaming transcription configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptionFileConfig {
    pub api_key: Option<String>,

    /// Recognition model (e.g. "nova-2")
    pub model: Option<String>,

    /// Provider-side endpointing silence in milliseconds
    pub endpointing_ms: Option<u32>,

    /// Provider-side utterance-end gap in milliseconds
    pub utterance_end_ms: Option<u32>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    pub base_url: Option<String>,

    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// System prompt prepended to every conversation
    pub system_prompt: Option<String>,

    pub max_tokens: Option<u32>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub api_key: Option<String>,
    pub voice_id: Option<String>,
    pub model: Option<String>,
}

/// Per-call session tunables
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Inactivity before a stalled utterance is force-finalized
    pub speech_timeout_ms: Option<u64>,

    /// Consecutive empty transcripts before force-finalizing
    pub empty_transcript_threshold: Option<u32>,

    /// Minimum interim characters that count as barge-in speech
    pub barge_in_min_chars: Option<usize>,

    /// Greeting spoken when the stream starts; empty disables it
    pub greeting: Option<String>,

    /// Keypad digits the bridge answers
    pub keypad_digits: Option<Vec<String>>,
}

/// Call-initiation rules
#[derive(Debug, Default, Deserialize)]
pub struct CallsFileConfig {
    /// Accepted counterpart categories (payor names)
    pub allowed_payors: Option<Vec<String>>,
}

/// Parse a config file body
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> crate::Result<BridgeConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `BridgeConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BridgeConfigFile {
    let Some(path) = config_file_path() else {
        return BridgeConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
pub fn load_config_file_from(path: &Path) -> BridgeConfigFile {
    if !path.exists() {
        return BridgeConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BridgeConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BridgeConfigFile::default()
        }
    }
}

/// Return the config file path: `DIALBRIDGE_CONFIG` or `~/.config/dialbridge/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("DIALBRIDGE_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("dialbridge").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let file = parse_config_file(
            r#"
            [server]
            port = 5004
            api_keys = ["key-1", "key-2"]

            [session]
            speech_timeout_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(file.server.port, Some(5004));
        assert_eq!(file.server.api_keys.unwrap().len(), 2);
        assert_eq!(file.session.speech_timeout_ms, Some(1500));
        assert!(file.llm.model.is_none());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        assert!(parse_config_file("[server]\nport = \"nope\"").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let file = load_config_file_from(Path::new("/definitely/not/here.toml"));
        assert!(file.server.port.is_none());
    }

    #[test]
    fn test_unparseable_file_yields_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "this is = = not toml").unwrap();

        let file = load_config_file_from(tmp.path());
        assert!(file.server.domain.is_none());
    }
}
