//! Twilio call control over the REST API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::Telephony;
use crate::{Config, Error, Result};

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

/// Places outbound calls and sends keypad tones
pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: SecretString,
    from_number: String,
    domain: String,
}

impl TwilioClient {
    /// Create a client from config
    ///
    /// # Errors
    ///
    /// Returns error if account credentials or the caller ID are missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let telephony = &config.telephony;
        let account_sid = telephony
            .account_sid
            .clone()
            .ok_or_else(|| Error::Config("Twilio account SID required".to_string()))?;
        let auth_token = telephony
            .auth_token
            .clone()
            .ok_or_else(|| Error::Config("Twilio auth token required".to_string()))?;
        let from_number = telephony
            .from_number
            .clone()
            .ok_or_else(|| Error::Config("caller ID (FROM_NUMBER) required".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            from_number,
            domain: config.server.domain.clone(),
        })
    }

    fn calls_url(&self) -> String {
        format!("{API_BASE}/Accounts/{}/Calls.json", self.account_sid)
    }

    /// Webhook Twilio fetches TwiML from once the callee answers
    fn answer_url(&self) -> String {
        format!("https://{}/incoming", self.domain)
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<CallResource> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Telephony(format!("Twilio error {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Telephony for TwilioClient {
    async fn initiate_call(&self, destination: &str) -> Result<String> {
        let answer_url = self.answer_url();
        let call = self
            .post_form(
                &self.calls_url(),
                &[
                    ("To", destination),
                    ("From", self.from_number.as_str()),
                    ("Url", answer_url.as_str()),
                ],
            )
            .await?;

        tracing::info!(call_sid = %call.sid, "outbound call created");
        Ok(call.sid)
    }

    async fn send_signal_tone(&self, call_id: &str, digits: &str) -> Result<()> {
        let url = format!("{API_BASE}/Accounts/{}/Calls/{call_id}.json", self.account_sid);
        self.post_form(&url, &[("SendDigits", digits)]).await?;
        tracing::debug!(call_sid = call_id, digits, "keypad tone requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::BridgeConfigFile;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_sources(BridgeConfigFile::default(), |name| {
            vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_requires_credentials() {
        let err = TwilioClient::from_config(&config(&[])).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_urls_use_account_and_domain() {
        let client = TwilioClient::from_config(&config(&[
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "secret"),
            ("FROM_NUMBER", "+15550000"),
            ("SERVER_DOMAIN", "bridge.example.com"),
        ]))
        .unwrap();

        assert_eq!(
            client.calls_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json"
        );
        assert_eq!(client.answer_url(), "https://bridge.example.com/incoming");
    }
}
