//! API key authentication middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::{ApiError, ApiState};

/// Extract API key from the `x-api-key` header
fn extract_api_key(req: &Request) -> Option<&str> {
    req.headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Middleware to verify API key against the configured allow-list
pub async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.config.server.api_keys.is_empty() {
        tracing::warn!("no API keys configured, rejecting call request");
        return Err(ApiError::Unauthorized);
    }

    match extract_api_key(&req) {
        Some(key) if state.config.server.accepts_api_key(key) => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!("invalid API key provided");
            Err(ApiError::Unauthorized)
        }
        None => {
            tracing::debug!("no API key provided");
            Err(ApiError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_extract_api_key() {
        let mut req = Request::builder().body(Body::empty()).unwrap();

        // No header
        assert_eq!(extract_api_key(&req), None);

        req.headers_mut()
            .insert("x-api-key", HeaderValue::from_static("test-key-123"));
        assert_eq!(extract_api_key(&req), Some("test-key-123"));

        req.headers_mut()
            .insert("x-api-key", HeaderValue::from_static("  "));
        assert_eq!(extract_api_key(&req), None);
    }
}
