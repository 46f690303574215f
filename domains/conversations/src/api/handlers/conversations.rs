//! Conversation lifecycle API handlers

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
use crate::domain::entities::{Conversation, ConversationStatus};

use super::messages::MessageResponse;

/// Request for creating a conversation
#[derive(Debug, Deserialize, Validate)]
pub struct CreateConversationRequest {
    pub outlet_id: Uuid,

    #[validate(length(min = 1, max = 32))]
    pub customer_phone: String,

    #[validate(length(max = 200))]
    pub customer_name: Option<String>,
}

/// Request for resolving or creating a customer's conversation
#[derive(Debug, Deserialize, Validate)]
pub struct FindOrCreateRequest {
    pub outlet_id: Uuid,

    #[validate(length(min = 1, max = 32))]
    pub customer_phone: String,

    #[validate(length(max = 200))]
    pub customer_name: Option<String>,
}

/// Request for escalating a conversation to a human agent
#[derive(Debug, Deserialize, Validate)]
pub struct HandoffRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,

    pub agent_id: Option<Uuid>,
}

/// Request for assigning an agent
#[derive(Debug, Deserialize, Validate)]
pub struct AssignAgentRequest {
    pub agent_id: Uuid,
}

/// Request for a status transition
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: ConversationStatus,
}

/// Request from the external scheduler driving the inactivity sweep
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ExpireInactiveRequest {
    #[validate(range(min = 1))]
    pub threshold_minutes: Option<i64>,
}

/// Query params for listing active conversations
#[derive(Debug, Deserialize)]
pub struct ListActiveQuery {
    pub outlet_id: Option<Uuid>,
}

/// Query params for fetching one conversation
#[derive(Debug, Deserialize)]
pub struct GetConversationQuery {
    #[serde(default)]
    pub include_messages: bool,
}

/// Conversation response DTO
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
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

impl From<Conversation> for ConversationResponse {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            tenant_id: c.tenant_id,
            outlet_id: c.outlet_id,
            customer_phone: c.customer_phone,
            customer_name: c.customer_name,
            status: c.status,
            handoff_requested: c.handoff_requested,
            handoff_reason: c.handoff_reason,
            handoff_agent_id: c.handoff_agent_id,
            started_at: c.started_at,
            ended_at: c.ended_at,
            last_message_at: c.last_message_at,
        }
    }
}

/// Conversation with optionally embedded history
#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    #[serde(flatten)]
    pub conversation: ConversationResponse,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageResponse>>,
}

/// Result of the inactivity sweep
#[derive(Debug, Serialize)]
pub struct ExpireInactiveResponse {
    pub expired: u64,
}

/// Create a new conversation
pub async fn create_conversation(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    ValidatedJson(req): ValidatedJson<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>)> {
    let created = state
        .registry
        .create(tenant_id, req.outlet_id, req.customer_phone, req.customer_name)
        .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// List active conversations for the tenant
pub async fn list_active_conversations(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    Query(query): Query<ListActiveQuery>,
) -> Result<Json<Vec<ConversationResponse>>> {
    let convs = state.registry.list_active(tenant_id, query.outlet_id).await?;
    Ok(Json(convs.into_iter().map(Into::into).collect()))
}

/// Resolve the customer's active conversation, creating one if absent
///
/// Returns 201 when this call created the conversation, 200 when an
/// existing one was found.
pub async fn find_or_create_conversation(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    ValidatedJson(req): ValidatedJson<FindOrCreateRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>)> {
    let (conv, created) = state
        .registry
        .find_or_create_by_customer(tenant_id, req.outlet_id, req.customer_phone, req.customer_name)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(conv.into())))
}

/// Get a single conversation, optionally with embedded history
pub async fn get_conversation(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
    Query(query): Query<GetConversationQuery>,
) -> Result<Json<ConversationDetailResponse>> {
    let conv = state.registry.get(id, tenant_id).await?;

    let messages = if query.include_messages {
        let history = state.ledger.history(tenant_id, id, None).await?;
        Some(history.into_iter().map(Into::into).collect())
    } else {
        None
    };

    Ok(Json(ConversationDetailResponse {
        conversation: conv.into(),
        messages,
    }))
}

/// Escalate a conversation to a human agent
pub async fn request_handoff(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<HandoffRequest>,
) -> Result<Json<ConversationResponse>> {
    let updated = state
        .registry
        .request_handoff(id, tenant_id, req.reason, req.agent_id)
        .await?;
    Ok(Json(updated.into()))
}

/// Return a handed-off conversation to automated handling
pub async fn release_handoff(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>> {
    let updated = state.registry.release_handoff(id, tenant_id).await?;
    Ok(Json(updated.into()))
}

/// Assign an agent to a conversation
pub async fn assign_agent(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AssignAgentRequest>,
) -> Result<Json<ConversationResponse>> {
    let updated = state.registry.assign_agent(id, tenant_id, req.agent_id).await?;
    Ok(Json(updated.into()))
}

/// Transition a conversation's status
pub async fn update_status(
    TenantId(tenant_id): TenantId,
    State(state): State<ConversationsState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateStatusRequest>,
) -> Result<Json<ConversationResponse>> {
    let updated = state.registry.update_status(id, tenant_id, req.status).await?;
    Ok(Json(updated.into()))
}

/// Bulk-expire inactive conversations (external scheduler entrypoint)
pub async fn expire_inactive_conversations(
    TenantId(_tenant_id): TenantId,
    State(state): State<ConversationsState>,
    ValidatedJson(req): ValidatedJson<ExpireInactiveRequest>,
) -> Result<Json<ExpireInactiveResponse>> {
    let threshold = req
        .threshold_minutes
        .unwrap_or(state.default_expiry_minutes);
    let expired = state.registry.expire_inactive(threshold).await?;
    Ok(Json(ExpireInactiveResponse { expired }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_validation() {
        let valid = CreateConversationRequest {
            outlet_id: Uuid::new_v4(),
            customer_phone: "+628123".to_string(),
            customer_name: None,
        };
        assert!(valid.validate().is_ok());

        let empty_phone = CreateConversationRequest {
            outlet_id: Uuid::new_v4(),
            customer_phone: String::new(),
            customer_name: None,
        };
        assert!(empty_phone.validate().is_err());
    }

    #[test]
    fn test_handoff_request_requires_reason() {
        let missing_reason = HandoffRequest {
            reason: String::new(),
            agent_id: None,
        };
        assert!(missing_reason.validate().is_err());
    }

    #[test]
    fn test_expire_request_threshold_must_be_positive() {
        let bad = ExpireInactiveRequest {
            threshold_minutes: Some(0),
        };
        assert!(bad.validate().is_err());

        let defaulted = ExpireInactiveRequest::default();
        assert!(defaulted.validate().is_ok());
    }

    #[test]
    fn test_detail_response_flattens_conversation() {
        let conv =
            Conversation::new(Uuid::new_v4(), Uuid::new_v4(), "+1".to_string(), None).unwrap();
        let detail = ConversationDetailResponse {
            conversation: conv.clone().into(),
            messages: None,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], conv.id.to_string());
        assert_eq!(json["status"], "active");
        assert!(json.get("messages").is_none());
    }
}
