//! Message API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use chatrelay_common::{Result, TenantId, ValidatedJson};

use crate::api::middleware::ConversationsState;
use crate::domain::entities::{Message, MessageMetadata, SenderType};

/// Request for appending a message
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,

    pub sender_type: SenderType,

    pub sender_id: Option<Uuid>,

    #[validate(length(min = 1, max = 10000))]
    pub content: String,

    #[validate(length(max = 128))]
    pub external_message_id: Option<String>,

    pub metadata: Option<MessageMetadata>,
}

/// Query params for the history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Query params for the context-window endpoint
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub count: Option<i64>,
}

/// Message response DTO
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_type: SenderType,
    pub sender_id: Option<Uuid>,
    pub content: String,
    pub external_message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_type: m.sender_type,
            sender_id: m.sender_id,
            content: m.content,
            external_message_id: m.external_message_id,
            timestamp: m.timestamp,
            metadata: m.metadata.map(|j| j.0),
        }
    }
}

/// Response for message append: the stored message plus the
/// conversation's handoff state after detection ran
#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: MessageResponse,
    pub handoff_requested: bool,
    pub handoff_reason: Option<String>,
}

/// Append a message to a conversation
///
/// Runs the handoff detector when `sender_type` is `customer`.
pub async fn send_message(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    ValidatedJson(req): ValidatedJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>)> {
    let outcome = state
        .ledger
        .append(
            tenant_id,
            req.conversation_id,
            req.sender_type,
            req.content,
            req.sender_id,
            req.external_message_id,
            req.metadata,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message: outcome.message.into(),
            handoff_requested: outcome.handoff_requested,
            handoff_reason: outcome.handoff_reason,
        }),
    ))
}

/// Ordered message history for a conversation
pub async fn list_messages(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageResponse>>> {
    let messages = state
        .ledger
        .history(tenant_id, conversation_id, query.limit)
        .await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Recent context window for a conversation, oldest first
pub async fn recent_messages(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<MessageResponse>>> {
    let messages = state
        .ledger
        .recent(tenant_id, conversation_id, query.count)
        .await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_request_deserializes_metadata() {
        let json = r#"{
            "conversation_id": "00000000-0000-0000-0000-000000000001",
            "sender_type": "llm",
            "content": "response",
            "metadata": {"low_confidence": true, "tokens_used": 12}
        }"#;
        let req: SendMessageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.sender_type, SenderType::Llm);
        let meta = req.metadata.unwrap();
        assert_eq!(meta.low_confidence, Some(true));
        assert_eq!(meta.tokens_used, Some(12));
    }

    #[test]
    fn test_send_message_request_content_validation() {
        let req = SendMessageRequest {
            conversation_id: Uuid::new_v4(),
            sender_type: SenderType::Customer,
            sender_id: None,
            content: String::new(),
            external_message_id: None,
            metadata: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_message_response_omits_absent_metadata() {
        let msg = Message::new(
            Uuid::new_v4(),
            SenderType::Customer,
            "hi".to_string(),
            None,
            None,
            None,
        )
        .unwrap();
        let json = serde_json::to_value(MessageResponse::from(msg)).unwrap();
        assert!(json.get("metadata").is_none());
        assert_eq!(json["sender_type"], "customer");
    }
}
