//! Media-stream WebSocket, one dialogue session per connection

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::ApiState;
use crate::call::Session;
use crate::call::protocol::OutboundFrame;

/// Inbound frames buffered ahead of the session loop
const INBOUND_BUFFER: usize = 256;

/// Outbound frames buffered ahead of the socket writer
const OUTBOUND_BUFFER: usize = 64;

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/connection", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();

    state.call_started();
    tracing::info!(active_calls = state.active_calls(), "media stream connected");

    let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_BUFFER);
    let (in_tx, in_rx) = mpsc::channel::<String>(INBOUND_BUFFER);

    // Forward session frames to the socket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode outbound frame"),
            }
        }
    });

    // Feed socket text to the session
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if in_tx.send(text.to_string()).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::debug!("media socket closed by provider");
                    break;
                }
                _ => {}
            }
        }
    });

    let session = Session::new(
        state.providers.clone(),
        state.registry.clone(),
        &state.config.session,
        &state.config.llm.system_prompt,
        out_tx,
    );

    if let Err(e) = session.run(in_rx).await {
        tracing::warn!(error = %e, "call session ended with error");
    }

    recv_task.abort();
    // drains frames already queued by the session
    let _ = send_task.await;

    state.call_ended();
    tracing::info!(active_calls = state.active_calls(), "media stream disconnected");
}
