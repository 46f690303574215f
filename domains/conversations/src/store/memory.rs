//! In-memory store implementation
//!
//! Enforces the same semantics as the PostgreSQL store (active-triple
//! conflict, external-id dedup, monotone `last_message_at`) behind a
//! single mutex. Used by the service tests and the local factory when
//! no database is configured.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::entities::{Conversation, ConversationStatus, Message};
use crate::store::{ConversationStore, StoreError};

#[derive(Default)]
struct Inner {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

/// Mutex-guarded in-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of conversations, across all tenants.
    pub fn conversation_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").conversations.len()
    }

    /// Total number of messages, across all conversations.
    pub fn message_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").messages.len()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, conv: &Conversation) -> Result<Conversation, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let active_exists = inner.conversations.iter().any(|c| {
            c.tenant_id == conv.tenant_id
                && c.outlet_id == conv.outlet_id
                && c.customer_phone == conv.customer_phone
                && c.status == ConversationStatus::Active
        });
        if active_exists && conv.status == ConversationStatus::Active {
            return Err(StoreError::Conflict);
        }

        inner.conversations.push(conv.clone());
        Ok(conv.clone())
    }

    async fn get_conversation(
        &self,
        id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<Conversation>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .conversations
            .iter()
            .find(|c| c.id == id && c.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_active_by_customer(
        &self,
        tenant_id: Uuid,
        outlet_id: Uuid,
        customer_phone: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .conversations
            .iter()
            .find(|c| {
                c.tenant_id == tenant_id
                    && c.outlet_id == outlet_id
                    && c.customer_phone == customer_phone
                    && c.status == ConversationStatus::Active
            })
            .cloned())
    }

    async fn list_active(
        &self,
        tenant_id: Uuid,
        outlet_id: Option<Uuid>,
    ) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut convs: Vec<Conversation> = inner
            .conversations
            .iter()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.status == ConversationStatus::Active
                    && outlet_id.map(|o| c.outlet_id == o).unwrap_or(true)
            })
            .cloned()
            .collect();

        // last_message_at DESC NULLS LAST, started_at DESC
        convs.sort_by(|a, b| match (b.last_message_at, a.last_message_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => b.started_at.cmp(&a.started_at),
        });
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
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let Some(conv) = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == id && c.tenant_id == tenant_id)
        else {
            return Ok(None);
        };

        conv.handoff_requested = requested;
        conv.handoff_reason = reason;
        conv.handoff_agent_id = agent_id;
        conv.status = status;
        Ok(Some(conv.clone()))
    }

    async fn set_status(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        status: ConversationStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Conversation>, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let Some(conv) = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == id && c.tenant_id == tenant_id)
        else {
            return Ok(None);
        };

        conv.status = status;
        if ended_at.is_some() {
            conv.ended_at = ended_at;
        }
        Ok(Some(conv.clone()))
    }

    async fn expire_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let now = Utc::now();
        let mut count = 0;
        for conv in inner.conversations.iter_mut() {
            if conv.status == ConversationStatus::Active
                && conv.last_message_at.map(|t| t < cutoff).unwrap_or(false)
            {
                conv.status = ConversationStatus::Expired;
                conv.ended_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn append_message(&self, msg: &Message) -> Result<(Message, bool), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        if let Some(external_id) = &msg.external_message_id {
            if let Some(existing) = inner.messages.iter().find(|m| {
                m.conversation_id == msg.conversation_id
                    && m.external_message_id.as_deref() == Some(external_id.as_str())
            }) {
                return Ok((existing.clone(), false));
            }
        }

        inner.messages.push(msg.clone());

        if let Some(conv) = inner
            .conversations
            .iter_mut()
            .find(|c| c.id == msg.conversation_id)
        {
            conv.last_message_at = Some(match conv.last_message_at {
                Some(existing) => existing.max(msg.timestamp),
                None => msg.timestamp,
            });
        }

        Ok((msg.clone(), true))
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        count: i64,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let skip = messages.len().saturating_sub(count.max(0) as usize);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn message_history(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, StoreError> {
        self.recent_messages(conversation_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::SenderType;

    fn conversation(tenant: Uuid, outlet: Uuid, phone: &str) -> Conversation {
        Conversation::new(tenant, outlet, phone.to_string(), None).unwrap()
    }

    fn message(conversation_id: Uuid, content: &str, external: Option<&str>) -> Message {
        Message::new(
            conversation_id,
            SenderType::Customer,
            content.to_string(),
            None,
            external.map(|e| e.to_string()),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_second_active_conversation_for_triple_conflicts() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let outlet = Uuid::new_v4();

        store
            .create_conversation(&conversation(tenant, outlet, "+628123"))
            .await
            .unwrap();
        let err = store
            .create_conversation(&conversation(tenant, outlet, "+628123"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_same_phone_different_outlet_allowed() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();

        store
            .create_conversation(&conversation(tenant, Uuid::new_v4(), "+628123"))
            .await
            .unwrap();
        store
            .create_conversation(&conversation(tenant, Uuid::new_v4(), "+628123"))
            .await
            .unwrap();
        assert_eq!(store.conversation_count(), 2);
    }

    #[tokio::test]
    async fn test_resolved_conversation_frees_the_triple() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let outlet = Uuid::new_v4();

        let first = store
            .create_conversation(&conversation(tenant, outlet, "+628123"))
            .await
            .unwrap();
        store
            .set_status(
                first.id,
                tenant,
                ConversationStatus::Resolved,
                Some(Utc::now()),
            )
            .await
            .unwrap();

        // A new active conversation may now be created for the triple
        store
            .create_conversation(&conversation(tenant, outlet, "+628123"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_is_tenant_scoped() {
        let store = MemoryStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let conv = store
            .create_conversation(&conversation(tenant_a, Uuid::new_v4(), "+1"))
            .await
            .unwrap();

        assert!(store
            .get_conversation(conv.id, tenant_a)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_conversation(conv.id, tenant_b)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_append_bumps_last_message_at_monotonically() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let conv = store
            .create_conversation(&conversation(tenant, Uuid::new_v4(), "+1"))
            .await
            .unwrap();

        let mut first = message(conv.id, "first", None);
        let mut second = message(conv.id, "second", None);
        second.timestamp = first.timestamp + chrono::Duration::seconds(10);

        store.append_message(&first).await.unwrap();
        let after_first = store
            .get_conversation(conv.id, tenant)
            .await
            .unwrap()
            .unwrap()
            .last_message_at
            .unwrap();

        store.append_message(&second).await.unwrap();
        let after_second = store
            .get_conversation(conv.id, tenant)
            .await
            .unwrap()
            .unwrap()
            .last_message_at
            .unwrap();
        assert!(after_second >= after_first);

        // An out-of-order append never decreases the recency stamp
        first.id = Uuid::new_v4();
        first.timestamp = after_second - chrono::Duration::seconds(60);
        store.append_message(&first).await.unwrap();
        let after_stale = store
            .get_conversation(conv.id, tenant)
            .await
            .unwrap()
            .unwrap()
            .last_message_at
            .unwrap();
        assert_eq!(after_stale, after_second);
    }

    #[tokio::test]
    async fn test_external_id_dedup_returns_existing_row() {
        let store = MemoryStore::new();
        let conv = store
            .create_conversation(&conversation(Uuid::new_v4(), Uuid::new_v4(), "+1"))
            .await
            .unwrap();

        let (stored, created) = store
            .append_message(&message(conv.id, "hello", Some("wamid.1")))
            .await
            .unwrap();
        assert!(created);

        let (dup, created) = store
            .append_message(&message(conv.id, "hello again", Some("wamid.1")))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(dup.id, stored.id);
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn test_recent_messages_oldest_first_window() {
        let store = MemoryStore::new();
        let conv = store
            .create_conversation(&conversation(Uuid::new_v4(), Uuid::new_v4(), "+1"))
            .await
            .unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let mut msg = message(conv.id, &format!("msg-{i}"), None);
            msg.timestamp = base + chrono::Duration::seconds(i);
            store.append_message(&msg).await.unwrap();
        }

        let recent = store.recent_messages(conv.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg-2");
        assert_eq!(recent[2].content, "msg-4");
        assert!(recent.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_expire_inactive_only_touches_stale_active_rows() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let stale = store
            .create_conversation(&conversation(tenant, Uuid::new_v4(), "+1"))
            .await
            .unwrap();
        let fresh = store
            .create_conversation(&conversation(tenant, Uuid::new_v4(), "+2"))
            .await
            .unwrap();
        let silent = store
            .create_conversation(&conversation(tenant, Uuid::new_v4(), "+3"))
            .await
            .unwrap();

        let mut old_msg = message(stale.id, "old", None);
        old_msg.timestamp = Utc::now() - chrono::Duration::hours(2);
        store.append_message(&old_msg).await.unwrap();
        store.append_message(&message(fresh.id, "new", None)).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let expired = store.expire_inactive(cutoff).await.unwrap();
        assert_eq!(expired, 1);

        let stale = store.get_conversation(stale.id, tenant).await.unwrap().unwrap();
        assert_eq!(stale.status, ConversationStatus::Expired);
        assert!(stale.ended_at.is_some());

        let fresh = store.get_conversation(fresh.id, tenant).await.unwrap().unwrap();
        assert_eq!(fresh.status, ConversationStatus::Active);

        // Never-messaged conversations are not expired by the sweep
        let silent = store.get_conversation(silent.id, tenant).await.unwrap().unwrap();
        assert_eq!(silent.status, ConversationStatus::Active);
    }

    #[tokio::test]
    async fn test_list_active_ordered_by_recency() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let outlet = Uuid::new_v4();

        let a = store
            .create_conversation(&conversation(tenant, outlet, "+1"))
            .await
            .unwrap();
        let b = store
            .create_conversation(&conversation(tenant, outlet, "+2"))
            .await
            .unwrap();

        let base = Utc::now();
        let mut msg_a = message(a.id, "older", None);
        msg_a.timestamp = base;
        let mut msg_b = message(b.id, "newer", None);
        msg_b.timestamp = base + chrono::Duration::seconds(5);
        store.append_message(&msg_a).await.unwrap();
        store.append_message(&msg_b).await.unwrap();

        let listed = store.list_active(tenant, None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);

        let filtered = store.list_active(tenant, Some(Uuid::new_v4())).await.unwrap();
        assert!(filtered.is_empty());
    }
}
