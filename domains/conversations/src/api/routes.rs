//! Route definitions for the Conversations domain API
//!
//! Mounted under `/api/v1` by the composition root.

use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{conversations, messages};
use super::middleware::ConversationsState;

/// Create conversation routes
fn conversation_routes() -> Router<ConversationsState> {
    Router::new()
        .route(
            "/conversations",
            post(conversations::create_conversation),
        )
        .route(
            "/conversations/active",
            get(conversations::list_active_conversations),
        )
        .route(
            "/conversations/find-or-create",
            post(conversations::find_or_create_conversation),
        )
        .route(
            "/conversations/expire-inactive",
            post(conversations::expire_inactive_conversations),
        )
        .route("/conversations/{id}", get(conversations::get_conversation))
        .route(
            "/conversations/{id}/handoff",
            post(conversations::request_handoff),
        )
        .route(
            "/conversations/{id}/handoff/release",
            post(conversations::release_handoff),
        )
        .route(
            "/conversations/{id}/assign",
            put(conversations::assign_agent),
        )
        .route(
            "/conversations/{id}/status",
            put(conversations::update_status),
        )
}

/// Create message routes
fn message_routes() -> Router<ConversationsState> {
    Router::new()
        .route("/messages", post(messages::send_message))
        .route(
            "/conversations/{id}/messages",
            get(messages::list_messages),
        )
        .route(
            "/conversations/{id}/messages/recent",
            get(messages::recent_messages),
        )
}

/// Create all Conversations domain API routes
pub fn routes() -> Router<ConversationsState> {
    Router::new()
        .merge(conversation_routes())
        .merge(message_routes())
}
