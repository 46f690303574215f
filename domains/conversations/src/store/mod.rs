//! Persistence abstraction for conversations and messages
//!
//! The store exposes exactly the primitives the registry and ledger
//! need: a compare-and-set style create guarded by the one-active-
//! conversation-per-customer constraint, tenant-scoped reads, targeted
//! field updates, the bulk inactivity sweep, and a transactional
//! message append that bumps `last_message_at` in the same unit.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entities::{Conversation, ConversationStatus, Message};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store-level error taxonomy.
///
/// `Conflict` is the distinguishable unique-constraint violation on
/// the active-conversation triple; everything else surfaces as a
/// database failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("an active conversation already exists for this customer")]
    Conflict,

    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for chatrelay_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => chatrelay_common::Error::Conflict(
                "An active conversation already exists for this customer".to_string(),
            ),
            StoreError::NotFound => {
                chatrelay_common::Error::NotFound("Conversation not found".to_string())
            }
            StoreError::Database(e) => chatrelay_common::Error::Database(e),
        }
    }
}

/// Durable CRUD for conversations and messages.
///
/// All conversation reads are tenant-scoped: an id belonging to a
/// different tenant behaves exactly like an id that does not exist.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a conversation. Fails with `StoreError::Conflict` when an
    /// active conversation already exists for the
    /// `(tenant_id, outlet_id, customer_phone)` triple.
    async fn create_conversation(&self, conv: &Conversation) -> Result<Conversation, StoreError>;

    /// Fetch a conversation by id within a tenant.
    async fn get_conversation(
        &self,
        id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Find the active conversation for a customer triple, if any.
    async fn find_active_by_customer(
        &self,
        tenant_id: Uuid,
        outlet_id: Uuid,
        customer_phone: &str,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Active conversations for a tenant, most recent message first.
    async fn list_active(
        &self,
        tenant_id: Uuid,
        outlet_id: Option<Uuid>,
    ) -> Result<Vec<Conversation>, StoreError>;

    /// Set the handoff fields and status in one update.
    async fn apply_handoff(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        requested: bool,
        reason: Option<String>,
        agent_id: Option<Uuid>,
        status: ConversationStatus,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Set the status, optionally stamping `ended_at`.
    async fn set_status(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        status: ConversationStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Bulk-expire active conversations whose `last_message_at` is
    /// older than `cutoff`. Returns the number of rows transitioned.
    async fn expire_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Append a message and bump the conversation's `last_message_at`
    /// in the same transaction.
    ///
    /// When the message carries an `external_message_id` that already
    /// exists for the conversation, the stored duplicate is returned
    /// with `created = false` and nothing is inserted.
    async fn append_message(&self, msg: &Message) -> Result<(Message, bool), StoreError>;

    /// Up to `count` most recent messages, re-ordered oldest first.
    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        count: i64,
    ) -> Result<Vec<Message>, StoreError>;

    /// Newest-bounded history window, oldest first, for UI display.
    async fn message_history(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_maps_to_common_taxonomy() {
        let err: chatrelay_common::Error = StoreError::Conflict.into();
        assert!(matches!(err, chatrelay_common::Error::Conflict(_)));

        let err: chatrelay_common::Error = StoreError::NotFound.into();
        assert!(matches!(err, chatrelay_common::Error::NotFound(_)));

        let err: chatrelay_common::Error = StoreError::Database(sqlx::Error::PoolClosed).into();
        assert!(matches!(err, chatrelay_common::Error::Database(_)));
    }
}
