//! Message ledger: append-only history with handoff detection
//!
//! Appends run as one store transaction (insert + recency bump). For
//! customer messages the handoff detector is evaluated afterwards
//! against the recent ledger window; a detection or transition failure
//! degrades to "no handoff" and never fails the append that already
//! committed.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use chatrelay_common::{Error, Result};
use chatrelay_realtime::{RealtimeHub, Room, ServerEvent};

use crate::domain::entities::{Conversation, Message, MessageMetadata, SenderType};
use crate::domain::handoff::{DetectorInput, HandoffDetector, DETECTION_WINDOW};
use crate::service::registry::ConversationRegistry;
use crate::store::ConversationStore;

/// Default context window for LLM prompt assembly
pub const CONTEXT_WINDOW: i64 = 4;

/// Default history window for UI display
pub const HISTORY_LIMIT: i64 = 50;

/// Upper bound on any caller-supplied window size
const MAX_WINDOW: i64 = 200;

/// Result of an append: the stored message plus the conversation's
/// handoff state after detection ran.
#[derive(Debug, Serialize)]
pub struct AppendOutcome {
    pub message: Message,
    pub handoff_requested: bool,
    pub handoff_reason: Option<String>,
}

pub struct MessageLedger {
    store: Arc<dyn ConversationStore>,
    hub: Arc<RealtimeHub>,
    registry: Arc<ConversationRegistry>,
    detector: HandoffDetector,
}

impl MessageLedger {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        hub: Arc<RealtimeHub>,
        registry: Arc<ConversationRegistry>,
    ) -> Self {
        Self::with_detector(store, hub, registry, HandoffDetector::default())
    }

    pub fn with_detector(
        store: Arc<dyn ConversationStore>,
        hub: Arc<RealtimeHub>,
        registry: Arc<ConversationRegistry>,
        detector: HandoffDetector,
    ) -> Self {
        Self {
            store,
            hub,
            registry,
            detector,
        }
    }

    /// Append a message to a conversation within the caller's tenant.
    ///
    /// Duplicate deliveries (same `external_message_id`) return the
    /// previously stored row without re-running detection or
    /// re-broadcasting.
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        sender_type: SenderType,
        content: String,
        sender_id: Option<Uuid>,
        external_message_id: Option<String>,
        metadata: Option<MessageMetadata>,
    ) -> Result<AppendOutcome> {
        // Tenant-scoped existence check; a foreign-tenant id is a 404
        let conv = self
            .store
            .get_conversation(conversation_id, tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;

        let msg = Message::new(
            conversation_id,
            sender_type,
            content,
            sender_id,
            external_message_id,
            metadata,
        )?;

        let (stored, created) = self.store.append_message(&msg).await?;
        if !created {
            tracing::debug!(
                %conversation_id,
                external_message_id = ?stored.external_message_id,
                "duplicate delivery, returning stored message"
            );
            return Ok(AppendOutcome {
                message: stored,
                handoff_requested: conv.handoff_requested,
                handoff_reason: conv.handoff_reason,
            });
        }

        self.broadcast_message(&conv, &stored);

        // Escalation runs only for customer messages, and never for
        // conversations that already escalated
        let escalated = if sender_type == SenderType::Customer && !conv.handoff_requested {
            self.run_detection(&conv, &stored).await
        } else {
            None
        };

        let (handoff_requested, handoff_reason) = match escalated {
            Some(updated) => (updated.handoff_requested, updated.handoff_reason),
            None => (conv.handoff_requested, conv.handoff_reason),
        };

        Ok(AppendOutcome {
            message: stored,
            handoff_requested,
            handoff_reason,
        })
    }

    /// Run the detector and apply the transition through the registry.
    ///
    /// Any failure here is logged and degrades to "no handoff"; the
    /// appended message has already committed.
    async fn run_detection(&self, conv: &Conversation, msg: &Message) -> Option<Conversation> {
        let recent = match self.store.recent_messages(conv.id, DETECTION_WINDOW).await {
            Ok(recent) => recent,
            Err(e) => {
                tracing::error!(conversation_id = %conv.id, error = %e, "detector window read failed");
                Vec::new()
            }
        };

        let signal = self.detector.detect(&DetectorInput {
            content: &msg.content,
            recent: &recent,
        })?;

        match self
            .registry
            .request_handoff(conv.id, conv.tenant_id, signal.reason, None)
            .await
        {
            Ok(updated) => Some(updated),
            Err(e) => {
                tracing::error!(conversation_id = %conv.id, error = %e, "handoff transition failed");
                None
            }
        }
    }

    fn broadcast_message(&self, conv: &Conversation, msg: &Message) {
        let payload = match serde_json::to_value(msg) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(conversation_id = %conv.id, error = %e, "failed to serialize message event");
                return;
            }
        };

        self.hub.broadcast(
            Room::Conversation(conv.id),
            &ServerEvent::ConversationMessage(payload.clone()),
        );
        // Tenant room gets the same event to refresh its last-message
        // summary
        self.hub.broadcast(
            Room::Tenant(conv.tenant_id),
            &ServerEvent::ConversationMessage(payload),
        );
    }

    /// Most recent `count` messages, oldest first, for use as context.
    pub async fn recent(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        count: Option<i64>,
    ) -> Result<Vec<Message>> {
        self.store
            .get_conversation(conversation_id, tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;

        let count = count.unwrap_or(CONTEXT_WINDOW).clamp(1, MAX_WINDOW);
        Ok(self.store.recent_messages(conversation_id, count).await?)
    }

    /// Newest-bounded history, oldest first, for UI display.
    pub async fn history(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Message>> {
        self.store
            .get_conversation(conversation_id, tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;

        let limit = limit.unwrap_or(HISTORY_LIMIT).clamp(1, MAX_WINDOW);
        Ok(self.store.message_history(conversation_id, limit).await?)
    }
}
