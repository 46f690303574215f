//! Room membership table and broadcast fan-out
//!
//! The hub owns the only piece of in-process mutable shared state in
//! the conversation core. Registry and ledger code never touch room
//! membership directly; they only call `broadcast(room, event)`.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::{Room, ServerEvent};

/// Per-connection outbound queue depth. A slow consumer that falls
/// this far behind starts losing frames rather than backpressuring
/// the originating request.
pub(crate) const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Room-based broadcaster for connected dashboard clients.
///
/// Safe under concurrent join/leave/broadcast. Emit failures are
/// swallowed: a disconnected or saturated client never propagates an
/// error back to the registry or ledger call that triggered the
/// broadcast.
#[derive(Debug, Default)]
pub struct RealtimeHub {
    rooms: DashMap<Room, HashMap<Uuid, mpsc::Sender<String>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to a room. Joining a room twice replaces the
    /// previous sender for that connection.
    pub fn join(&self, room: Room, conn_id: Uuid, tx: mpsc::Sender<String>) {
        self.rooms.entry(room).or_default().insert(conn_id, tx);
        tracing::debug!(%room, %conn_id, "client joined room");
    }

    /// Remove a connection from a single room.
    pub fn leave(&self, room: Room, conn_id: Uuid) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&conn_id);
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
        tracing::debug!(%room, %conn_id, "client left room");
    }

    /// Remove a connection from every room it joined. Called on
    /// disconnect.
    pub fn leave_all(&self, conn_id: Uuid) {
        for mut entry in self.rooms.iter_mut() {
            entry.value_mut().remove(&conn_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());
    }

    /// Broadcast an event to every connection in a room.
    ///
    /// Returns the number of connections the frame was queued for.
    /// Dead members (closed receiver) are pruned; full queues drop the
    /// frame for that client only.
    pub fn broadcast(&self, room: Room, event: &ServerEvent) -> usize {
        let frame = match serde_json::to_string(event) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(%room, error = %e, "failed to serialize realtime event");
                return 0;
            }
        };

        let Some(mut members) = self.rooms.get_mut(&room) else {
            return 0;
        };

        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();
        for (conn_id, tx) in members.iter() {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*conn_id),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(%room, %conn_id, "realtime client queue full, dropping frame");
                }
            }
        }
        for conn_id in dead {
            members.remove(&conn_id);
        }
        delivered
    }

    /// Number of connections currently in a room.
    pub fn member_count(&self, room: Room) -> usize {
        self.rooms.get(&room).map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(OUTBOUND_QUEUE_DEPTH)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_room_members() {
        let hub = RealtimeHub::new();
        let tenant = Uuid::new_v4();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();

        hub.join(Room::Tenant(tenant), Uuid::new_v4(), tx_a);
        hub.join(Room::Tenant(tenant), Uuid::new_v4(), tx_b);

        let delivered = hub.broadcast(
            Room::Tenant(tenant),
            &ServerEvent::ConversationNew(json!({"id": 1})),
        );
        assert_eq!(delivered, 2);

        let frame: serde_json::Value =
            serde_json::from_str(&rx_a.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "conversation:new");
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_broadcast_does_not_cross_tenant_rooms() {
        let hub = RealtimeHub::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();

        hub.join(Room::Tenant(tenant_a), Uuid::new_v4(), tx_a);
        hub.join(Room::Tenant(tenant_b), Uuid::new_v4(), tx_b);

        let delivered = hub.broadcast(
            Room::Tenant(tenant_a),
            &ServerEvent::ConversationStatus(json!({})),
        );
        assert_eq!(delivered, 1);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let hub = RealtimeHub::new();
        let conversation = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let (tx, mut rx) = channel();

        hub.join(Room::Conversation(conversation), conn, tx);
        hub.leave(Room::Conversation(conversation), conn);

        let delivered = hub.broadcast(
            Room::Conversation(conversation),
            &ServerEvent::ConversationMessage(json!({})),
        );
        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_all_clears_every_room() {
        let hub = RealtimeHub::new();
        let tenant = Uuid::new_v4();
        let conversation = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let (tx, _rx) = channel();

        hub.join(Room::Tenant(tenant), conn, tx.clone());
        hub.join(Room::Conversation(conversation), conn, tx);
        hub.leave_all(conn);

        assert_eq!(hub.member_count(Room::Tenant(tenant)), 0);
        assert_eq!(hub.member_count(Room::Conversation(conversation)), 0);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned() {
        let hub = RealtimeHub::new();
        let tenant = Uuid::new_v4();
        let (tx, rx) = channel();
        drop(rx);

        hub.join(Room::Tenant(tenant), Uuid::new_v4(), tx);
        assert_eq!(hub.member_count(Room::Tenant(tenant)), 1);

        let delivered = hub.broadcast(
            Room::Tenant(tenant),
            &ServerEvent::ConversationNew(json!({})),
        );
        assert_eq!(delivered, 0);
        assert_eq!(hub.member_count(Room::Tenant(tenant)), 0);
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_room_is_noop() {
        let hub = RealtimeHub::new();
        let delivered = hub.broadcast(
            Room::Tenant(Uuid::new_v4()),
            &ServerEvent::ConversationHandoff(json!({})),
        );
        assert_eq!(delivered, 0);
    }
}
