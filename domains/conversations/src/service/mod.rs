//! Service layer: conversation registry and message ledger

pub mod ledger;
pub mod registry;

pub use ledger::{AppendOutcome, MessageLedger};
pub use registry::ConversationRegistry;
