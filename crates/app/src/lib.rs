//! Chatrelay application composition root
//!
//! Wires the conversation core together: Postgres store, registry,
//! ledger, realtime hub, and the REST + WebSocket routers.

use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;

use chatrelay_common::Config;
use chatrelay_conversations::{
    ConversationRegistry, ConversationStore, ConversationsState, MessageLedger, PgStore,
};
use chatrelay_realtime::RealtimeHub;

/// Create the main application router with all routes
pub async fn create_app(config: Config, pool: PgPool) -> Result<Router, anyhow::Error> {
    let hub = Arc::new(RealtimeHub::new());
    let store: Arc<dyn ConversationStore> = Arc::new(PgStore::new(pool));

    let registry = Arc::new(ConversationRegistry::new(store.clone(), hub.clone()));
    let ledger = Arc::new(MessageLedger::new(
        store,
        hub.clone(),
        registry.clone(),
    ));

    let conversations_state = ConversationsState {
        registry,
        ledger,
        default_expiry_minutes: config.expiry_threshold_minutes,
    };

    // Compose domain routers with shared infrastructure routes
    let app = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route(
            "/",
            axum::routing::get(|| async { "Chatrelay conversation core v0.1.0" }),
        )
        .nest(
            "/api/v1",
            chatrelay_conversations::routes().with_state(conversations_state),
        )
        .merge(chatrelay_realtime::routes().with_state(hub));

    Ok(app)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
