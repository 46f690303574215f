//! Shared utilities, configuration, and error handling for Chatrelay
//!
//! This crate provides common functionality used across the Chatrelay
//! conversation core:
//! - Configuration management following 12-factor principles
//! - Error taxonomy shared by every domain crate
//! - Axum extractors (tenant header, validated JSON bodies)
//! - State machine error types

pub mod config;
pub mod error;
pub mod extractors;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use extractors::{TenantId, ValidatedJson, TENANT_HEADER};
pub use state::StateError;
