//! WebSocket endpoint for dashboard connections.
//!
//! Client -> Server (JSON):
//! ```json
//! {"type": "tenant:join", "tenant_id": "..."}
//! {"type": "conversation:join", "conversation_id": "..."}
//! {"type": "conversation:leave", "conversation_id": "..."}
//! ```
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "conversation:new", "payload": {...}}
//! {"type": "conversation:message", "payload": {...}}
//! {"type": "conversation:handoff", "payload": {...}}
//! {"type": "conversation:status", "payload": {...}}
//! ```

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::Room;
use crate::hub::{RealtimeHub, OUTBOUND_QUEUE_DEPTH};

/// WebSocket subscription frame from a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientFrame {
    #[serde(rename = "tenant:join")]
    TenantJoin { tenant_id: Uuid },
    #[serde(rename = "conversation:join")]
    ConversationJoin { conversation_id: Uuid },
    #[serde(rename = "conversation:leave")]
    ConversationLeave { conversation_id: Uuid },
}

/// WebSocket routes for the realtime hub.
pub fn routes() -> Router<Arc<RealtimeHub>> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<RealtimeHub>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, hub))
}

/// Handle an individual dashboard connection.
///
/// Spawns a sender task forwarding broadcast frames to the socket and
/// loops reading subscription frames from the client. Membership is
/// cleaned up on disconnect.
async fn handle_socket(socket: WebSocket, hub: Arc<RealtimeHub>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let conn_id = Uuid::new_v4();

    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);

    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let frame: ClientFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(%conn_id, "invalid realtime frame: {e}");
                        continue;
                    }
                };

                match frame {
                    ClientFrame::TenantJoin { tenant_id } => {
                        hub.join(Room::Tenant(tenant_id), conn_id, tx.clone());
                    }
                    ClientFrame::ConversationJoin { conversation_id } => {
                        hub.join(Room::Conversation(conversation_id), conn_id, tx.clone());
                    }
                    ClientFrame::ConversationLeave { conversation_id } => {
                        hub.leave(Room::Conversation(conversation_id), conn_id);
                    }
                }
            }
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping (handled by the tungstenite layer)
        }
    }

    hub.leave_all(conn_id);
    sender_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_tenant_join() {
        let tenant = Uuid::new_v4();
        let json = format!(r#"{{"type": "tenant:join", "tenant_id": "{tenant}"}}"#);
        let frame: ClientFrame = serde_json::from_str(&json).unwrap();
        assert!(matches!(frame, ClientFrame::TenantJoin { tenant_id } if tenant_id == tenant));
    }

    #[test]
    fn test_client_frame_conversation_join_and_leave() {
        let id = Uuid::new_v4();
        let join = format!(r#"{{"type": "conversation:join", "conversation_id": "{id}"}}"#);
        let leave = format!(r#"{{"type": "conversation:leave", "conversation_id": "{id}"}}"#);
        assert!(matches!(
            serde_json::from_str::<ClientFrame>(&join).unwrap(),
            ClientFrame::ConversationJoin { conversation_id } if conversation_id == id
        ));
        assert!(matches!(
            serde_json::from_str::<ClientFrame>(&leave).unwrap(),
            ClientFrame::ConversationLeave { conversation_id } if conversation_id == id
        ));
    }

    #[test]
    fn test_client_frame_unknown_type_rejected() {
        let result = serde_json::from_str::<ClientFrame>(r#"{"type": "nope"}"#);
        assert!(result.is_err());
    }
}
