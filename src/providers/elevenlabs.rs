//! ElevenLabs text-to-speech

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::SpeechSynthesizer;
use crate::config::TtsConfig;
use crate::{Error, Result};

const API_BASE: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Telephony-native output so audio can be forwarded without transcoding
const OUTPUT_FORMAT: &str = "ulaw_8000";

/// Synthesizes phone-ready μ-law audio
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: SecretString,
    voice_id: String,
    model: String,
}

impl ElevenLabsSynthesizer {
    /// Create a synthesizer from config
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("ElevenLabs API key required for TTS".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id: config.voice_id.clone(),
            model: config.model.clone(),
        })
    }

    fn stream_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("{API_BASE}/{}/stream", self.voice_id))
            .map_err(|e| Error::Tts(format!("invalid voice id {}: {e}", self.voice_id)))?;
        url.query_pairs_mut()
            .append_pair("output_format", OUTPUT_FORMAT)
            .append_pair("optimize_streaming_latency", "3");
        Ok(url)
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(self.stream_url()?)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> TtsConfig {
        TtsConfig {
            api_key: api_key.map(SecretString::from),
            voice_id: "voice-1".to_string(),
            model: "eleven_turbo_v2".to_string(),
        }
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            ElevenLabsSynthesizer::from_config(&config(None)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_stream_url_requests_mulaw() {
        let tts = ElevenLabsSynthesizer::from_config(&config(Some("xi"))).unwrap();
        let url = tts.stream_url().unwrap();

        assert_eq!(url.path(), "/v1/text-to-speech/voice-1/stream");
        assert!(url.query().unwrap().contains("output_format=ulaw_8000"));
    }
}
