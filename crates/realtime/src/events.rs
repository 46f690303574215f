//! Room identifiers and server-to-client event frames

use serde::Serialize;
use uuid::Uuid;

/// A publish/subscribe scope clients can join.
///
/// Tenant rooms carry every conversation-level event for a tenant;
/// conversation rooms carry the detail feed for one conversation.
/// Room keys never mix tenants: a conversation room is only ever
/// published to by operations that already resolved the conversation
/// within the caller's tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Tenant(Uuid),
    Conversation(Uuid),
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Room::Tenant(id) => write!(f, "tenant:{}", id),
            Room::Conversation(id) => write!(f, "conversation:{}", id),
        }
    }
}

/// Server -> client event frame.
///
/// Payloads are pre-serialized JSON values so this crate stays
/// independent of the domain entity types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// A conversation was created (tenant room)
    #[serde(rename = "conversation:new")]
    ConversationNew(serde_json::Value),

    /// A message was appended (conversation room + tenant room summary)
    #[serde(rename = "conversation:message")]
    ConversationMessage(serde_json::Value),

    /// Handoff requested or released (conversation room)
    #[serde(rename = "conversation:handoff")]
    ConversationHandoff(serde_json::Value),

    /// Conversation status changed (conversation room)
    #[serde(rename = "conversation:status")]
    ConversationStatus(serde_json::Value),
}
