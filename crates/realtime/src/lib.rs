//! Realtime hub: room-scoped publish/subscribe for dashboard clients
//!
//! Connected operator dashboards join rooms (one per tenant, one per
//! focused conversation) and receive pushed state changes. Delivery is
//! best-effort, at-most-once per connected client; the hub is a
//! liveness signal, not a source of truth. Clients that reconnect must
//! re-fetch state through the REST API.

pub mod events;
pub mod hub;
pub mod ws;

pub use events::{Room, ServerEvent};
pub use hub::RealtimeHub;
pub use ws::routes;
