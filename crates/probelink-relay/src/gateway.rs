//! Observer-facing HTTP and WebSocket surface.
//!
//! Observers connect to `/ws`. Each socket is split: a forward task drains
//! the session's event channel into outbound text frames while the read
//! side parses requests and applies them to shared state. `/api/devices`
//! exposes the registry snapshot over plain REST.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use probelink_proto::{DeviceInfo, ObserverRequest};
use tracing::{debug, warn};

use crate::state::RelayState;

/// Builds the observer-facing router.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/devices", get(list_devices))
        .with_state(state)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles one observer connection.
async fn handle_socket(socket: WebSocket, state: RelayState) {
    let (observer_id, mut events) = state.attach_observer().await;
    let (mut sender, mut receiver) = socket.split();

    // Forward task: session events become outbound text frames.
    let forward = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        debug!(observer = %observer_id, "event forward task ended");
    });

    while let Some(received) = receiver.next().await {
        let message = match received {
            Ok(message) => message,
            Err(err) => {
                warn!(observer = %observer_id, "websocket error: {err}");
                break;
            }
        };
        match message {
            Message::Text(text) => match serde_json::from_str::<ObserverRequest>(&text) {
                Ok(request) => state.handle_observer_request(observer_id, request).await,
                Err(err) => warn!(observer = %observer_id, "invalid observer request: {err}"),
            },
            Message::Close(_) => break,
            // Ping and Pong are handled by axum; Binary is not part of the
            // observer protocol.
            _ => {}
        }
    }

    state.detach_observer(observer_id);
    forward.abort();
}

/// `GET /api/devices` — current registry snapshot.
async fn list_devices(State(state): State<RelayState>) -> Json<Vec<DeviceInfo>> {
    Json(state.registry.snapshot().await)
}
