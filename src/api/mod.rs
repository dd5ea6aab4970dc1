//! HTTP API server for the dialogue bridge

mod auth;
pub mod calls;
pub mod health;
mod media_stream;
pub mod twiml;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::call::CallRegistry;
use crate::providers::Providers;
use crate::{Config, Result};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub providers: Providers,
    pub registry: CallRegistry,
    active_calls: Arc<AtomicUsize>,
}

impl ApiState {
    #[must_use]
    pub fn new(config: Config, providers: Providers) -> Self {
        Self {
            config: Arc::new(config),
            providers,
            registry: CallRegistry::new(),
            active_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Media streams currently connected
    #[must_use]
    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }

    fn call_started(&self) {
        self.active_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn call_ended(&self) {
        self.active_calls.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Handler failure rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized: Invalid API key.".to_string(),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(calls::router(state.clone()))
        .merge(twiml::router(state.clone()))
        .merge(media_stream::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: ApiState) -> Self {
        let port = state.config.server.port;
        Self {
            state: Arc::new(state),
            port,
        }
    }

    /// Run the API server until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            domain = %self.state.config.server.domain,
            "API server listening"
        );

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received shutdown signal");
                }
            })
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
