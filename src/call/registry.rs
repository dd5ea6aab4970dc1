//! In-memory registry of outbound call briefs
//!
//! The call-initiation endpoint stores the validated request here under the
//! provider's call id; the media session for that call reads it to brief the
//! language model and removes it when the call ends.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// Parameters of one outbound call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallBrief {
    pub to_number: String,
    pub payor_name: String,
    #[serde(rename = "NPI")]
    pub npi: String,
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub subscriber_id: String,
    #[serde(rename = "TIN")]
    pub tin: String,
    pub callback_number: String,
    pub date_of_birth: String,
    pub accepted_at: DateTime<Utc>,
}

impl CallBrief {
    /// Context block appended to the system prompt
    #[must_use]
    pub fn prompt_context(&self) -> String {
        format!(
            "You are calling {payor} on behalf of a provider office to verify a patient's benefits.\n\
             Patient: {first} {last}, date of birth {dob}.\n\
             Subscriber ID: {subscriber}.\n\
             Provider NPI: {npi}. Tax ID: {tin}.\n\
             Callback number: {callback}.\n\
             Share these details only when asked for them.",
            payor = self.payor_name,
            first = self.patient_first_name,
            last = self.patient_last_name,
            dob = self.date_of_birth,
            subscriber = self.subscriber_id,
            npi = self.npi,
            tin = self.tin,
            callback = self.callback_number,
        )
    }
}

/// Shared map from call id to brief
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    inner: Arc<RwLock<HashMap<String, CallBrief>>>,
}

impl CallRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, call_id: impl Into<String>, brief: CallBrief) {
        self.inner.write().await.insert(call_id.into(), brief);
    }

    pub async fn get(&self, call_id: &str) -> Option<CallBrief> {
        self.inner.read().await.get(call_id).cloned()
    }

    pub async fn remove(&self, call_id: &str) -> Option<CallBrief> {
        self.inner.write().await.remove(call_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_brief() -> CallBrief {
    CallBrief {
        to_number: "+15550100".to_string(),
        payor_name: "humana".to_string(),
        npi: "1234567890".to_string(),
        patient_first_name: "Jane".to_string(),
        patient_last_name: "Doe".to_string(),
        subscriber_id: "H123".to_string(),
        tin: "99-1234567".to_string(),
        callback_number: "+15550199".to_string(),
        date_of_birth: "1980-02-03".to_string(),
        accepted_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = CallRegistry::new();
        assert!(registry.is_empty().await);

        registry.insert("CA1", sample_brief()).await;
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("CA1").await.unwrap().payor_name, "humana");
        assert!(registry.get("CA2").await.is_none());

        assert!(registry.remove("CA1").await.is_some());
        assert!(registry.remove("CA1").await.is_none());
    }

    #[test]
    fn test_prompt_context_mentions_patient() {
        let context = sample_brief().prompt_context();
        assert!(context.contains("Jane Doe"));
        assert!(context.contains("H123"));
        assert!(context.contains("humana"));
    }
}
