//! Conversations domain state

use std::sync::Arc;

use crate::service::{ConversationRegistry, MessageLedger};

/// Application state for the Conversations domain
#[derive(Clone)]
pub struct ConversationsState {
    pub registry: Arc<ConversationRegistry>,
    pub ledger: Arc<MessageLedger>,
    /// Fallback threshold for the inactivity sweep when the scheduler
    /// does not supply one
    pub default_expiry_minutes: i64,
}
