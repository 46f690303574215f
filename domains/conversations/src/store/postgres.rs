//! PostgreSQL store implementation
//!
//! The active-triple invariant is enforced by a partial unique index
//! (`WHERE status = 'active'`); a violation surfaces as
//! `StoreError::Conflict` so the registry can retry its lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{Conversation, ConversationStatus, Message};
use crate::store::{ConversationStore, StoreError};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for migrations)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_insert_error(e: sqlx::Error) -> StoreError {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Database(e),
        }
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn create_conversation(&self, conv: &Conversation) -> Result<Conversation, StoreError> {
        let created = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (
                id, tenant_id, outlet_id, customer_phone, customer_name,
                status, handoff_requested, handoff_reason, handoff_agent_id,
                started_at, ended_at, last_message_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id, tenant_id, outlet_id, customer_phone, customer_name,
                      status, handoff_requested, handoff_reason, handoff_agent_id,
                      started_at, ended_at, last_message_at
            "#,
        )
        .bind(conv.id)
        .bind(conv.tenant_id)
        .bind(conv.outlet_id)
        .bind(&conv.customer_phone)
        .bind(&conv.customer_name)
        .bind(conv.status)
        .bind(conv.handoff_requested)
        .bind(&conv.handoff_reason)
        .bind(conv.handoff_agent_id)
        .bind(conv.started_at)
        .bind(conv.ended_at)
        .bind(conv.last_message_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_insert_error)?;

        Ok(created)
    }

    async fn get_conversation(
        &self,
        id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        let conv = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, tenant_id, outlet_id, customer_phone, customer_name,
                   status, handoff_requested, handoff_reason, handoff_agent_id,
                   started_at, ended_at, last_message_at
            FROM conversations
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conv)
    }

    async fn find_active_by_customer(
        &self,
        tenant_id: Uuid,
        outlet_id: Uuid,
        customer_phone: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let conv = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, tenant_id, outlet_id, customer_phone, customer_name,
                   status, handoff_requested, handoff_reason, handoff_agent_id,
                   started_at, ended_at, last_message_at
            FROM conversations
            WHERE tenant_id = $1 AND outlet_id = $2 AND customer_phone = $3
              AND status = 'active'
            "#,
        )
        .bind(tenant_id)
        .bind(outlet_id)
        .bind(customer_phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conv)
    }

    async fn list_active(
        &self,
        tenant_id: Uuid,
        outlet_id: Option<Uuid>,
    ) -> Result<Vec<Conversation>, StoreError> {
        let convs = match outlet_id {
            Some(outlet) => {
                sqlx::query_as::<_, Conversation>(
                    r#"
                    SELECT id, tenant_id, outlet_id, customer_phone, customer_name,
                           status, handoff_requested, handoff_reason, handoff_agent_id,
                           started_at, ended_at, last_message_at
                    FROM conversations
                    WHERE tenant_id = $1 AND outlet_id = $2 AND status = 'active'
                    ORDER BY last_message_at DESC NULLS LAST, started_at DESC
                    "#,
                )
                .bind(tenant_id)
                .bind(outlet)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Conversation>(
                    r#"
                    SELECT id, tenant_id, outlet_id, customer_phone, customer_name,
                           status, handoff_requested, handoff_reason, handoff_agent_id,
                           started_at, ended_at, last_message_at
                    FROM conversations
                    WHERE tenant_id = $1 AND status = 'active'
                    ORDER BY last_message_at DESC NULLS LAST, started_at DESC
                    "#,
                )
                .bind(tenant_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(convs)
    }

    async fn apply_handoff(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        requested: bool,
        reason: Option<String>,
        agent_id: Option<Uuid>,
        status: ConversationStatus,
    ) -> Result<Option<Conversation>, StoreError> {
        let updated = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations SET
                handoff_requested = $3,
                handoff_reason = $4,
                handoff_agent_id = $5,
                status = $6
            WHERE id = $1 AND tenant_id = $2
            RETURNING id, tenant_id, outlet_id, customer_phone, customer_name,
                      status, handoff_requested, handoff_reason, handoff_agent_id,
                      started_at, ended_at, last_message_at
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(requested)
        .bind(reason)
        .bind(agent_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn set_status(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        status: ConversationStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Conversation>, StoreError> {
        let updated = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations SET
                status = $3,
                ended_at = COALESCE($4, ended_at)
            WHERE id = $1 AND tenant_id = $2
            RETURNING id, tenant_id, outlet_id, customer_phone, customer_name,
                      status, handoff_requested, handoff_reason, handoff_agent_id,
                      started_at, ended_at, last_message_at
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(status)
        .bind(ended_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn expire_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations SET
                status = 'expired',
                ended_at = NOW()
            WHERE status = 'active' AND last_message_at IS NOT NULL
              AND last_message_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn append_message(&self, msg: &Message) -> Result<(Message, bool), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Dedup against at-least-once inbound channel deliveries
        if let Some(external_id) = &msg.external_message_id {
            let existing = sqlx::query_as::<_, Message>(
                r#"
                SELECT id, conversation_id, sender_type, sender_id, content,
                       external_message_id, "timestamp", metadata
                FROM messages
                WHERE conversation_id = $1 AND external_message_id = $2
                "#,
            )
            .bind(msg.conversation_id)
            .bind(external_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = existing {
                tx.rollback().await?;
                return Ok((existing, false));
            }
        }

        let created = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender_type, sender_id, content,
                external_message_id, "timestamp", metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, conversation_id, sender_type, sender_id, content,
                      external_message_id, "timestamp", metadata
            "#,
        )
        .bind(msg.id)
        .bind(msg.conversation_id)
        .bind(msg.sender_type)
        .bind(msg.sender_id)
        .bind(&msg.content)
        .bind(&msg.external_message_id)
        .bind(msg.timestamp)
        .bind(&msg.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::map_insert_error)?;

        // last_message_at never decreases, even for out-of-order appends
        sqlx::query(
            r#"
            UPDATE conversations SET
                last_message_at = GREATEST(COALESCE(last_message_at, $2), $2)
            WHERE id = $1
            "#,
        )
        .bind(msg.conversation_id)
        .bind(msg.timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((created, true))
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        count: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let mut messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, sender_type, sender_id, content,
                   external_message_id, "timestamp", metadata
            FROM messages
            WHERE conversation_id = $1
            ORDER BY "timestamp" DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id)
        .bind(count)
        .fetch_all(&self.pool)
        .await?;

        // Oldest first for LLM/UI context
        messages.reverse();
        Ok(messages)
    }

    async fn message_history(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        self.recent_messages(conversation_id, limit).await
    }
}
