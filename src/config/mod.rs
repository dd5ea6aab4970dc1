//! Configuration management for the dialogue bridge

pub mod file;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};
use file::BridgeConfigFile;

/// Default HTTP port
const DEFAULT_PORT: u16 = 5004;

/// Default inactivity before a stalled utterance is force-finalized
const DEFAULT_SPEECH_TIMEOUT_MS: u64 = 2000;

/// Default consecutive empty transcripts before force-finalizing
const DEFAULT_EMPTY_TRANSCRIPT_THRESHOLD: u32 = 3;

/// Default system prompt for the phone agent
const DEFAULT_SYSTEM_PROMPT: &str = "You are a courteous assistant speaking on a phone call. \
Answer in short, natural spoken sentences. Never use lists, markdown, or emoji. \
Ask one question at a time and wait for the answer.";

/// Bridge configuration
#[derive(Debug)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Telephony call-control configuration
    pub telephony: TelephonyConfig,

    /// Streaming transcription configuration
    pub transcription: TranscriptionConfig,

    /// LLM completion configuration
    pub llm: LlmConfig,

    /// Speech synthesis configuration
    pub tts: TtsConfig,

    /// Per-call session tunables
    pub session: SessionConfig,

    /// Call-initiation rules
    pub calls: CallsConfig,
}

/// HTTP server configuration
#[derive(Debug)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Public host name used in TwiML stream URLs and call webhooks
    pub domain: String,

    /// API keys accepted on the call-initiation endpoint
    pub api_keys: Vec<SecretString>,
}

impl ServerConfig {
    /// Whether the given key is in the allow-list
    #[must_use]
    pub fn accepts_api_key(&self, candidate: &str) -> bool {
        self.api_keys
            .iter()
            .any(|key| key.expose_secret() == candidate)
    }
}

/// Telephony call-control configuration
#[derive(Debug, Default)]
pub struct TelephonyConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<SecretString>,

    /// Caller ID for outbound calls
    pub from_number: Option<String>,
}

/// Streaming transcription configuration
#[derive(Debug)]
pub struct TranscriptionConfig {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub endpointing_ms: u32,
    pub utterance_end_ms: u32,
}

/// LLM completion configuration
#[derive(Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
}

/// Speech synthesis configuration
#[derive(Debug)]
pub struct TtsConfig {
    pub api_key: Option<SecretString>,
    pub voice_id: String,
    pub model: String,
}

/// Per-call session tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Inactivity before a stalled utterance is force-finalized
    pub speech_timeout: Duration,

    /// Consecutive empty transcripts (after speech) before force-finalizing
    pub empty_transcript_threshold: u32,

    /// Minimum trimmed interim characters that count as speech
    pub barge_in_min_chars: usize,

    /// Greeting spoken as turn 0 when the stream starts
    pub greeting: Option<String>,

    /// Keypad digits answered when a menu prompt asks for them
    pub keypad_digits: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            speech_timeout: Duration::from_millis(DEFAULT_SPEECH_TIMEOUT_MS),
            empty_transcript_threshold: DEFAULT_EMPTY_TRANSCRIPT_THRESHOLD,
            barge_in_min_chars: 1,
            greeting: Some("Hello!".to_string()),
            keypad_digits: vec!["1".to_string()],
        }
    }
}

/// Call-initiation rules
#[derive(Debug, Clone)]
pub struct CallsConfig {
    /// Accepted counterpart categories, lowercase
    pub allowed_payors: Vec<String>,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            allowed_payors: vec!["bcbs-az".to_string(), "humana".to_string()],
        }
    }
}

/// Split a comma-separated env value into trimmed, non-empty items
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

impl Config {
    /// Load configuration from the environment and the optional config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but malformed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |name| std::env::var(name).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Precedence is env > toml > default.
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but malformed
    pub fn from_sources<F>(fc: BridgeConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |name: &str, fallback: Option<String>| {
            env(name)
                .or(fallback)
                .filter(|s| !s.is_empty())
                .map(SecretString::from)
        };

        let port = match env("DIALBRIDGE_PORT").or_else(|| env("PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid port: {raw}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };

        let api_keys = env("DIALBRIDGE_API_KEYS")
            .map(|v| split_list(&v))
            .or(fc.server.api_keys)
            .unwrap_or_default()
            .into_iter()
            .map(SecretString::from)
            .collect();

        let server = ServerConfig {
            port,
            domain: env("SERVER_DOMAIN")
                .or(fc.server.domain)
                .unwrap_or_else(|| format!("localhost:{port}")),
            api_keys,
        };

        let telephony = TelephonyConfig {
            account_sid: env("TWILIO_ACCOUNT_SID").or(fc.telephony.account_sid),
            auth_token: secret("TWILIO_AUTH_TOKEN", fc.telephony.auth_token),
            from_number: env("FROM_NUMBER").or(fc.telephony.from_number),
        };

        let transcription = TranscriptionConfig {
            api_key: secret("DEEPGRAM_API_KEY", fc.transcription.api_key),
            model: env("DEEPGRAM_MODEL")
                .or(fc.transcription.model)
                .unwrap_or_else(|| "nova-2".to_string()),
            endpointing_ms: fc.transcription.endpointing_ms.unwrap_or(500),
            utterance_end_ms: fc.transcription.utterance_end_ms.unwrap_or(1500),
        };

        let llm = LlmConfig {
            api_key: secret("OPENAI_API_KEY", fc.llm.api_key),
            base_url: env("OPENAI_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: env("OPENAI_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            system_prompt: env("DIALBRIDGE_SYSTEM_PROMPT")
                .or(fc.llm.system_prompt)
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: fc.llm.max_tokens.unwrap_or(300),
        };

        let tts = TtsConfig {
            api_key: secret("ELEVENLABS_API_KEY", fc.tts.api_key),
            voice_id: env("ELEVENLABS_VOICE_ID")
                .or(fc.tts.voice_id)
                .unwrap_or_else(|| "21m00Tcm4TlvDq8ikWAM".to_string()),
            model: env("ELEVENLABS_MODEL_ID")
                .or(fc.tts.model)
                .unwrap_or_else(|| "eleven_turbo_v2".to_string()),
        };

        let defaults = SessionConfig::default();
        let speech_timeout_ms = match env("DIALBRIDGE_SPEECH_TIMEOUT_MS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid speech timeout: {raw}")))?,
            None => fc
                .session
                .speech_timeout_ms
                .unwrap_or(DEFAULT_SPEECH_TIMEOUT_MS),
        };
        let greeting = env("DIALBRIDGE_GREETING")
            .or(fc.session.greeting)
            .or(defaults.greeting)
            .filter(|g| !g.trim().is_empty());
        let keypad_digits = env("DIALBRIDGE_KEYPAD_DIGITS")
            .map(|v| split_list(&v))
            .or(fc.session.keypad_digits)
            .unwrap_or(defaults.keypad_digits);
        let session = SessionConfig {
            speech_timeout: Duration::from_millis(speech_timeout_ms),
            empty_transcript_threshold: fc
                .session
                .empty_transcript_threshold
                .unwrap_or(defaults.empty_transcript_threshold)
                .max(1),
            barge_in_min_chars: fc
                .session
                .barge_in_min_chars
                .unwrap_or(defaults.barge_in_min_chars)
                .max(1),
            greeting,
            keypad_digits,
        };

        let calls = CallsConfig {
            allowed_payors: env("DIALBRIDGE_ALLOWED_PAYORS")
                .map(|v| split_list(&v))
                .or(fc.calls.allowed_payors)
                .map(|list| list.into_iter().map(|p| p.to_lowercase()).collect())
                .unwrap_or_else(|| CallsConfig::default().allowed_payors),
        };

        Ok(Self {
            server,
            telephony,
            transcription,
            llm,
            tts,
            session,
            calls,
        })
    }

    /// Check that every provider credential needed to serve calls is present
    ///
    /// # Errors
    ///
    /// Returns error naming every missing setting
    pub fn validate_for_serving(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.telephony.account_sid.is_none() {
            missing.push("TWILIO_ACCOUNT_SID");
        }
        if self.telephony.auth_token.is_none() {
            missing.push("TWILIO_AUTH_TOKEN");
        }
        if self.telephony.from_number.is_none() {
            missing.push("FROM_NUMBER");
        }
        if self.transcription.api_key.is_none() {
            missing.push("DEEPGRAM_API_KEY");
        }
        if self.llm.api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.tts.api_key.is_none() {
            missing.push("ELEVENLABS_API_KEY");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "missing configuration: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = Config::from_sources(BridgeConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.calls.allowed_payors, vec!["bcbs-az", "humana"]);
        assert!(config.server.api_keys.is_empty());
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = file::parse_config_file(
            r#"
            [server]
            port = 7000
            domain = "file.example.com"

            [llm]
            model = "file-model"
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_from(&[("PORT", "8080"), ("OPENAI_MODEL", "env-model")]),
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.domain, "file.example.com");
        assert_eq!(config.llm.model, "env-model");
    }

    #[test]
    fn test_api_key_allow_list() {
        let config = Config::from_sources(
            BridgeConfigFile::default(),
            env_from(&[("DIALBRIDGE_API_KEYS", "alpha, beta ,")]),
        )
        .unwrap();

        assert!(config.server.accepts_api_key("alpha"));
        assert!(config.server.accepts_api_key("beta"));
        assert!(!config.server.accepts_api_key("gamma"));
        assert!(!config.server.accepts_api_key(""));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result = Config::from_sources(BridgeConfigFile::default(), env_from(&[("PORT", "x")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_blank_greeting_disables_it() {
        let config = Config::from_sources(
            BridgeConfigFile::default(),
            env_from(&[("DIALBRIDGE_GREETING", "  ")]),
        )
        .unwrap();

        assert!(config.session.greeting.is_none());
    }

    #[test]
    fn test_keypad_digits_from_env() {
        let config = Config::from_sources(
            BridgeConfigFile::default(),
            env_from(&[("DIALBRIDGE_KEYPAD_DIGITS", "1, 2")]),
        )
        .unwrap();

        assert_eq!(config.session.keypad_digits, vec!["1", "2"]);
    }

    #[test]
    fn test_payors_are_lowercased() {
        let config = Config::from_sources(
            BridgeConfigFile::default(),
            env_from(&[("DIALBRIDGE_ALLOWED_PAYORS", "Aetna,CIGNA")]),
        )
        .unwrap();

        assert_eq!(config.calls.allowed_payors, vec!["aetna", "cigna"]);
    }

    #[test]
    fn test_validate_lists_every_missing_credential() {
        let config = Config::from_sources(
            BridgeConfigFile::default(),
            env_from(&[("DEEPGRAM_API_KEY", "dg")]),
        )
        .unwrap();

        let err = config.validate_for_serving().unwrap_err().to_string();
        assert!(err.contains("TWILIO_ACCOUNT_SID"));
        assert!(err.contains("OPENAI_API_KEY"));
        assert!(err.contains("ELEVENLABS_API_KEY"));
        assert!(!err.contains("DEEPGRAM_API_KEY"));
    }
}
