//! WebSocket transport for signaling.
//!
//! One socket is one connection. Frames are read and handled one at a time;
//! acks and room notifications are written by a separate task.

use crate::actors::{PeerNotifier, RoomRegistry};

use super::session::SignalingSession;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use common::types::ConnectionId;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Outbound ack queue per connection.
const ACK_BUFFER: usize = 64;

/// Router serving the signaling socket at `GET /ws`.
pub fn signaling_router(registry: RoomRegistry) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(registry)
}

async fn ws_handler(ws: WebSocketUpgrade, State(registry): State<RoomRegistry>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

#[instrument(skip_all, name = "rc.ws.connection", fields(connection_id))]
async fn handle_socket(socket: WebSocket, registry: RoomRegistry) {
    let connection_id = ConnectionId::new();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));
    info!(target: "rc.ws", connection_id = %connection_id, "WebSocket connected");

    let (notifier, mut notifications) =
        PeerNotifier::channel(connection_id, registry.settings().notification_buffer);
    let mut session = SignalingSession::new(registry, notifier);

    let (mut sink, mut stream) = socket.split();
    let (ack_tx, mut ack_rx) = mpsc::channel::<String>(ACK_BUFFER);

    let send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                Some(ack) = ack_rx.recv() => ack,
                Some(notification) = notifications.recv() => {
                    match serde_json::to_string(&notification) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(target: "rc.ws", error = %e, "Failed to encode notification");
                            continue;
                        }
                    }
                }
                else => break,
            };

            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Some(reply) = session.handle_text(&text).await {
                    if ack_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(target: "rc.ws", error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    session.disconnect().await;
    send_task.abort();

    info!(target: "rc.ws", connection_id = %connection_id, "WebSocket disconnected");
}
