//! Conversations domain: lifecycle state machine, message ledger, human handoff
//!
//! This crate owns the conversation lifecycle core: status transitions,
//! append-only message history, escalation-to-human detection, and the
//! broadcast of state changes through the realtime hub. Everything is
//! scoped by tenant; no operation ever crosses the tenant boundary.

pub mod api;
pub mod domain;
pub mod service;
pub mod store;

// Re-export domain types at the crate root for convenience
pub use domain::entities::{Conversation, ConversationStatus, Message, MessageMetadata, SenderType};
pub use domain::handoff::{HandoffDetector, HandoffSignal, HandoffTrigger};
pub use domain::state::{ConversationEvent, ConversationStateMachine, StateError};

// Re-export store types
pub use store::{ConversationStore, MemoryStore, PgStore, StoreError};

// Re-export service types
pub use service::{AppendOutcome, ConversationRegistry, MessageLedger};

// Re-export API types
pub use api::routes;
pub use api::ConversationsState;
