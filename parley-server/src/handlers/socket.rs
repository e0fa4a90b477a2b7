//! WebSocket bridge between clients and the hub.
//!
//! The socket task only encodes and decodes protocol frames; all chat
//! semantics live in [`ChatHub`]. The first text frame of a connection
//! must be `user-connected`; anything else closes the socket before a
//! presence entry exists.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Extension, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::IntoResponse,
    routing::any,
};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use shared::{config::server::Config, models::ClientEvent};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{app_state::AppState, realtime::hub::SharedChatHub};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", any(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(hub): Extension<SharedChatHub>,
    Extension(config): Extension<Arc<Config>>,
) -> impl IntoResponse {
    let capacity = config.chat.channel_capacity;
    ws.on_upgrade(move |socket| handle_socket(socket, hub, capacity))
}

async fn handle_socket(mut socket: WebSocket, hub: SharedChatHub, capacity: usize) {
    let Some(user_id) = await_identification(&mut socket).await else {
        let _ = socket.close().await;
        return;
    };

    let (tx, mut rx) = mpsc::channel(capacity);
    let session = hub.connect(user_id, tx).await;
    counter!("parley_socket_connections_total").increment(1);
    debug!(%user_id, session, "socket session established");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(event) => {
                    let Ok(frame) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                // The hub dropped our sender: this session was evicted
                // by a newer connection for the same user.
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => hub.dispatch(user_id, session, event).await,
                        Err(error) => {
                            debug!(%user_id, %error, "ignoring malformed frame");
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(%user_id, %error, "socket read failed");
                    break;
                }
            },
        }
    }

    // A stale session id is a no-op here, so an evicted socket cannot
    // tear down its replacement's presence entry.
    hub.disconnect(user_id, session).await;
    let _ = sink.close().await;
}

/// Waits for the identifying `user-connected` frame. Any other first
/// text frame, a close, or a transport error aborts the handshake.
async fn await_identification(socket: &mut WebSocket) -> Option<Uuid> {
    while let Some(frame) = socket.recv().await {
        match frame.ok()? {
            WsMessage::Text(text) => {
                return match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(ClientEvent::UserConnected { user_id }) => Some(user_id),
                    _ => None,
                };
            }
            WsMessage::Close(_) => return None,
            _ => {}
        }
    }
    None
}
