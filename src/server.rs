// SPDX-FileCopyrightText: 2025 blinry <mail@blinry.org>
// SPDX-FileCopyrightText: 2025 zormit <nt4u@kpvn.de>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Wire Adapter (C6): a thin, stateless-per-message translation layer
//! between the WebSocket transport and the registry's command interface.
//! Owns connection bootstrap, decode/encode, and disconnect propagation,
//! and nothing else — no OT, room, or persistence state lives here.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info, instrument, warn};

use crate::protocol::{ClientEvent, ServerEvent};
use crate::registry::Registry;

#[must_use]
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(registry)
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(registry): State<Registry>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, registry))
}

#[instrument(skip(socket, registry))]
async fn handle_connection(socket: WebSocket, registry: Registry) {
    let participant = registry.allocate_participant_id();
    info!(participant, "connection established");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = unbounded_channel::<ServerEvent>();
    registry.register_connection(participant, tx);

    let forward = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(%err, "failed to encode outgoing event");
                    continue;
                }
            };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(%err, "websocket read error, treating as disconnect");
                break;
            }
        };
        match message {
            Message::Text(text) => dispatch(&registry, participant, &text).await,
            Message::Binary(bytes) => {
                if let Ok(text) = String::from_utf8(bytes) {
                    dispatch(&registry, participant, &text).await;
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    forward.abort();
    registry.disconnect(participant);
    info!(participant, "connection closed");
}

/// Decode one inbound text frame and route it to the registry. A malformed
/// payload is reported back as a wire-level error without ever touching
/// registry state (§4.6).
async fn dispatch(registry: &Registry, participant: u64, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => registry.handle(participant, event).await,
        Err(err) => {
            debug!(%err, "malformed client event");
            registry
                .send_protocol_error(participant, format!("malformed event: {err}"))
                .await;
        }
    }
}
