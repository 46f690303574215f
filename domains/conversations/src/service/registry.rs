//! Conversation registry: state-machine owner
//!
//! The registry is the only writer of conversation rows. It resolves
//! lookups within the caller's tenant, applies status transitions
//! through the state machine, and pushes the resulting state changes
//! to the realtime hub. Broadcast failures are swallowed; they never
//! propagate back to the caller.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use chatrelay_common::{Error, Result};
use chatrelay_realtime::{RealtimeHub, Room, ServerEvent};

use crate::domain::entities::{Conversation, ConversationStatus};
use crate::domain::state::{ConversationEvent, ConversationStateMachine};
use crate::store::ConversationStore;

/// Bounded retries for the find-or-create race. One retry suffices in
/// practice (the loser re-reads the winner's row); the bound guards
/// against a pathological create/resolve interleaving.
const FIND_OR_CREATE_ATTEMPTS: usize = 3;

pub struct ConversationRegistry {
    store: Arc<dyn ConversationStore>,
    hub: Arc<RealtimeHub>,
}

impl ConversationRegistry {
    pub fn new(store: Arc<dyn ConversationStore>, hub: Arc<RealtimeHub>) -> Self {
        Self { store, hub }
    }

    /// Serialize and broadcast, logging failures instead of surfacing
    /// them.
    fn broadcast<T: Serialize>(&self, room: Room, build: fn(serde_json::Value) -> ServerEvent, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                self.hub.broadcast(room, &build(value));
            }
            Err(e) => {
                tracing::error!(%room, error = %e, "failed to serialize broadcast payload");
            }
        }
    }

    fn not_found() -> Error {
        // Unknown id and foreign-tenant id are deliberately
        // indistinguishable to the caller.
        Error::NotFound("Conversation not found".to_string())
    }

    /// Create a new conversation for a customer.
    ///
    /// Fails with `Conflict` when an active conversation already
    /// exists for the `(tenant, outlet, phone)` triple.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        outlet_id: Uuid,
        customer_phone: String,
        customer_name: Option<String>,
    ) -> Result<Conversation> {
        let conv = Conversation::new(tenant_id, outlet_id, customer_phone, customer_name)?;
        let created = self.store.create_conversation(&conv).await?;

        self.broadcast(
            Room::Tenant(tenant_id),
            ServerEvent::ConversationNew,
            &created,
        );
        Ok(created)
    }

    /// Resolve the active conversation for a customer, creating one if
    /// absent.
    ///
    /// Safe under concurrent callers: the store's uniqueness constraint
    /// guarantees a single row per race, and the loser re-reads the
    /// winner. Returns the conversation and whether this call created
    /// it.
    pub async fn find_or_create_by_customer(
        &self,
        tenant_id: Uuid,
        outlet_id: Uuid,
        customer_phone: String,
        customer_name: Option<String>,
    ) -> Result<(Conversation, bool)> {
        for _ in 0..FIND_OR_CREATE_ATTEMPTS {
            if let Some(existing) = self
                .store
                .find_active_by_customer(tenant_id, outlet_id, &customer_phone)
                .await?
            {
                return Ok((existing, false));
            }

            match self
                .create(
                    tenant_id,
                    outlet_id,
                    customer_phone.clone(),
                    customer_name.clone(),
                )
                .await
            {
                Ok(created) => return Ok((created, true)),
                Err(Error::Conflict(_)) => {
                    // Lost the race; loop to read the winner's row
                    tracing::debug!(%tenant_id, %outlet_id, "find-or-create lost race, re-reading");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Conflict(
            "Could not resolve an active conversation for this customer".to_string(),
        ))
    }

    /// Fetch a conversation by id within the caller's tenant.
    pub async fn get(&self, id: Uuid, tenant_id: Uuid) -> Result<Conversation> {
        self.store
            .get_conversation(id, tenant_id)
            .await?
            .ok_or_else(Self::not_found)
    }

    /// Active conversations for a tenant, most recent activity first.
    pub async fn list_active(
        &self,
        tenant_id: Uuid,
        outlet_id: Option<Uuid>,
    ) -> Result<Vec<Conversation>> {
        Ok(self.store.list_active(tenant_id, outlet_id).await?)
    }

    /// Escalate a conversation to a human agent.
    ///
    /// Re-requesting on an already handed-off conversation overwrites
    /// the stored reason.
    pub async fn request_handoff(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        reason: String,
        agent_id: Option<Uuid>,
    ) -> Result<Conversation> {
        let conv = self.get(id, tenant_id).await?;
        let next = ConversationStateMachine::transition(conv.status, ConversationEvent::RequestHandoff)
            .map_err(|e| Error::Validation(e.to_string()))?;

        let updated = self
            .store
            .apply_handoff(id, tenant_id, true, Some(reason), agent_id, next)
            .await?
            .ok_or_else(Self::not_found)?;

        self.broadcast(
            Room::Conversation(id),
            ServerEvent::ConversationHandoff,
            &updated,
        );
        Ok(updated)
    }

    /// Return a handed-off conversation to automated handling.
    ///
    /// Guarded no-op on terminal conversations: a resolved or expired
    /// conversation is returned unchanged rather than silently
    /// reopened.
    pub async fn release_handoff(&self, id: Uuid, tenant_id: Uuid) -> Result<Conversation> {
        let conv = self.get(id, tenant_id).await?;
        if conv.status.is_terminal() {
            tracing::debug!(%id, status = %conv.status, "handoff release on terminal conversation ignored");
            return Ok(conv);
        }

        let next = ConversationStateMachine::transition(conv.status, ConversationEvent::ReleaseHandoff)
            .map_err(|e| Error::Validation(e.to_string()))?;

        let updated = self
            .store
            .apply_handoff(id, tenant_id, false, None, None, next)
            .await?
            .ok_or_else(Self::not_found)?;

        self.broadcast(
            Room::Conversation(id),
            ServerEvent::ConversationHandoff,
            &updated,
        );
        Ok(updated)
    }

    /// Assign an agent, forcing the conversation into handed_off.
    pub async fn assign_agent(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        agent_id: Uuid,
    ) -> Result<Conversation> {
        let conv = self.get(id, tenant_id).await?;
        let next = ConversationStateMachine::transition(conv.status, ConversationEvent::AssignAgent)
            .map_err(|e| Error::Validation(e.to_string()))?;

        let updated = self
            .store
            .apply_handoff(
                id,
                tenant_id,
                true,
                conv.handoff_reason.clone(),
                Some(agent_id),
                next,
            )
            .await?
            .ok_or_else(Self::not_found)?;

        self.broadcast(
            Room::Conversation(id),
            ServerEvent::ConversationHandoff,
            &updated,
        );
        Ok(updated)
    }

    /// Transition a conversation to the requested status.
    ///
    /// Entering `resolved` or `expired` stamps `ended_at`; other
    /// transitions never clear it.
    pub async fn update_status(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        status: ConversationStatus,
    ) -> Result<Conversation> {
        let conv = self.get(id, tenant_id).await?;
        if conv.status == status {
            return Ok(conv);
        }

        let event = ConversationStateMachine::event_for_target(status);
        let next = ConversationStateMachine::transition(conv.status, event)
            .map_err(|e| Error::Validation(e.to_string()))?;

        let ended_at = next.is_terminal().then(Utc::now);
        let updated = self
            .store
            .set_status(id, tenant_id, next, ended_at)
            .await?
            .ok_or_else(Self::not_found)?;

        self.broadcast(
            Room::Conversation(id),
            ServerEvent::ConversationStatus,
            &updated,
        );
        Ok(updated)
    }

    /// Bulk-expire active conversations idle for longer than the
    /// threshold. Invoked by an external scheduler.
    pub async fn expire_inactive(&self, threshold_minutes: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::minutes(threshold_minutes);
        let count = self.store.expire_inactive(cutoff).await?;
        if count > 0 {
            tracing::info!(count, threshold_minutes, "expired inactive conversations");
        }
        Ok(count)
    }
}
