//! Outbound call initiation

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    middleware,
    routing::post,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::auth::require_api_key;
use super::{ApiError, ApiState};
use crate::call::CallBrief;

/// Body fields every call request must carry, in reporting order
pub const REQUIRED_FIELDS: [&str; 9] = [
    "toNumber",
    "payorName",
    "NPI",
    "patientFirstName",
    "patientLastName",
    "subscriberId",
    "TIN",
    "callbackNumber",
    "dateOfBirth",
];

/// Successful initiation response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    pub success: String,
    pub call_sid: String,
}

/// Build call routes; all of them require an API key
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/calls", post(create_call))
        .route("/nimbus-call", post(create_call))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

/// Read a field as text; numbers are accepted, blanks count as missing
fn text_field(body: &Value, name: &str) -> Option<String> {
    match body.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validate a call request body into a brief
///
/// # Errors
///
/// Returns `ApiError::BadRequest` listing every missing field, or naming the
/// allowed payors when `payorName` is not one of them
pub fn validate_request(body: &Value, allowed_payors: &[String]) -> Result<CallBrief, ApiError> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|name| text_field(body, name).is_none())
        .collect();

    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Missing fields: {}",
            missing.join(", ")
        )));
    }

    let field = |name: &str| text_field(body, name).unwrap_or_default();

    let payor_name = field("payorName");
    if !allowed_payors
        .iter()
        .any(|p| p.eq_ignore_ascii_case(&payor_name))
    {
        return Err(ApiError::BadRequest(format!(
            "Invalid payorName. Must be one of: {}",
            allowed_payors.join(", ")
        )));
    }

    Ok(CallBrief {
        to_number: field("toNumber"),
        payor_name,
        npi: field("NPI"),
        patient_first_name: field("patientFirstName"),
        patient_last_name: field("patientLastName"),
        subscriber_id: field("subscriberId"),
        tin: field("TIN"),
        callback_number: field("callbackNumber"),
        date_of_birth: field("dateOfBirth"),
        accepted_at: Utc::now(),
    })
}

async fn create_call(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> Result<Json<CallResponse>, ApiError> {
    let brief = validate_request(&body, &state.config.calls.allowed_payors)?;

    tracing::info!(
        to = %brief.to_number,
        payor = %brief.payor_name,
        "initiating outbound call"
    );

    let call_sid = state
        .providers
        .telephony
        .initiate_call(&brief.to_number)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to initiate call");
            ApiError::Internal("Failed to initiate call.".to_string())
        })?;

    let success = format!("Call initiated to {}", brief.to_number);
    state.registry.insert(call_sid.clone(), brief).await;

    Ok(Json(CallResponse { success, call_sid }))
}
