//! Domain entities for the Conversations domain
//!
//! Conversations are scoped by `(tenant_id, outlet_id)` and keyed to a
//! customer by phone number. Messages are append-only: once stored
//! they are never updated or deleted by this core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use chatrelay_common::{Error, Result};

/// Conversation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "conversation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Active,
    Resolved,
    HandedOff,
    Expired,
}

impl ConversationStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Expired)
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Resolved => write!(f, "resolved"),
            ConversationStatus::HandedOff => write!(f, "handed_off"),
            ConversationStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Message sender type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sender_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Llm,
    Agent,
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderType::Customer => write!(f, "customer"),
            SenderType::Llm => write!(f, "llm"),
            SenderType::Agent => write!(f, "agent"),
        }
    }
}

/// Maximum customer phone length (varchar(32))
const MAX_PHONE_LENGTH: usize = 32;

/// Maximum customer name length (varchar(200))
const MAX_NAME_LENGTH: usize = 200;

/// Maximum message content length (CHECK length <= 10000)
const MAX_CONTENT_LENGTH: usize = 10000;

/// Typed metadata on a message.
///
/// Known fields only; the handoff detector reads `low_confidence`
/// type-checked rather than probing an open JSON bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_confidence: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_context_used: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl MessageMetadata {
    /// True when the producing LLM flagged this response as low
    /// confidence.
    pub fn is_low_confidence(&self) -> bool {
        self.low_confidence.unwrap_or(false)
    }
}

/// Conversation entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub outlet_id: Uuid,
    pub customer_phone: String,
    pub customer_name: Option<String>,
    pub status: ConversationStatus,
    pub handoff_requested: bool,
    pub handoff_reason: Option<String>,
    pub handoff_agent_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Create a new active conversation for a customer
    pub fn new(
        tenant_id: Uuid,
        outlet_id: Uuid,
        customer_phone: String,
        customer_name: Option<String>,
    ) -> Result<Self> {
        // Validate phone (required, varchar(32))
        if customer_phone.trim().is_empty() {
            return Err(Error::Validation("Customer phone is required".to_string()));
        }
        if customer_phone.len() > MAX_PHONE_LENGTH {
            return Err(Error::Validation(format!(
                "Customer phone must be at most {} characters",
                MAX_PHONE_LENGTH
            )));
        }

        // Validate name (optional, varchar(200))
        if let Some(ref n) = customer_name {
            if n.len() > MAX_NAME_LENGTH {
                return Err(Error::Validation(format!(
                    "Customer name must be at most {} characters",
                    MAX_NAME_LENGTH
                )));
            }
        }

        Ok(Conversation {
            id: Uuid::new_v4(),
            tenant_id,
            outlet_id,
            customer_phone,
            customer_name,
            status: ConversationStatus::default(),
            handoff_requested: false,
            handoff_reason: None,
            handoff_agent_id: None,
            started_at: Utc::now(),
            ended_at: None,
            last_message_at: None,
        })
    }
}

/// Message entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_type: SenderType,
    pub sender_id: Option<Uuid>,
    pub content: String,
    pub external_message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<Json<MessageMetadata>>,
}

impl Message {
    /// Create a new message
    pub fn new(
        conversation_id: Uuid,
        sender_type: SenderType,
        content: String,
        sender_id: Option<Uuid>,
        external_message_id: Option<String>,
        metadata: Option<MessageMetadata>,
    ) -> Result<Self> {
        if content.trim().is_empty() {
            return Err(Error::Validation(
                "Message content cannot be empty or whitespace-only".to_string(),
            ));
        }
        if content.len() > MAX_CONTENT_LENGTH {
            return Err(Error::Validation(format!(
                "Message content must be at most {} characters",
                MAX_CONTENT_LENGTH
            )));
        }

        // Agent messages identify the sending operator
        if sender_type == SenderType::Agent && sender_id.is_none() {
            return Err(Error::Validation(
                "Agent messages require a sender_id".to_string(),
            ));
        }

        Ok(Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_type,
            sender_id,
            content,
            external_message_id,
            timestamp: Utc::now(),
            metadata: metadata.map(Json),
        })
    }

    /// True when this message is an LLM response flagged low confidence
    pub fn is_low_confidence_llm(&self) -> bool {
        self.sender_type == SenderType::Llm
            && self
                .metadata
                .as_ref()
                .map(|m| m.is_low_confidence())
                .unwrap_or(false)
    }
}
