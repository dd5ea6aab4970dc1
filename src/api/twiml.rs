//! TwiML webhooks that connect answered calls to the media stream

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::post,
};

use super::ApiState;

/// Spoken before connecting on the `/call/response` webhook
const RESPONSE_GREETING: &str = "Hello, this is an outbound call from the assistant.";

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/incoming", post(incoming))
        .route("/call/incoming", post(incoming))
        .route("/call/response", post(response))
        .with_state(state)
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// TwiML connecting the call to `wss://{domain}/connection`
#[must_use]
pub fn connect_stream(domain: &str, say: Option<&str>) -> String {
    let say = say
        .map(|text| format!("<Say>{}</Say>", escape_xml(text)))
        .unwrap_or_default();

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{say}<Connect><Stream url=\"wss://{}/connection\"/></Connect></Response>",
        escape_xml(domain)
    )
}

fn xml(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/xml")], body)
}

async fn incoming(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    tracing::info!("call answered, connecting media stream");
    xml(connect_stream(&state.config.server.domain, None))
}

async fn response(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    xml(connect_stream(
        &state.config.server.domain,
        Some(RESPONSE_GREETING),
    ))
}
