// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Structure:
// - mod.rs: Main router assembly and middleware
// - health.rs: Health check endpoint
// - conversations.rs: Conversation lifecycle, read cursors, unread counts
// - messages.rs: Message sending and listing
// - ws.rs: WebSocket upgrade for conversation sockets
// - extractors.rs: Custom Axum extractors (bearer identity)
// - middleware.rs: Request logging
//
// ============================================================================

mod conversations;
mod extractors;
mod health;
mod messages;
mod middleware;
mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub use extractors::AuthenticatedUser;

/// Create the main application router with all routes
pub fn create_router(app_context: Arc<AppContext>) -> Router {
    Router::new()
        // Health (unauthenticated)
        .route("/health", get(health::health_check))
        // Conversations
        .route(
            "/api/conversations",
            get(conversations::list).post(conversations::create),
        )
        .route("/api/conversations/direct", post(conversations::create_direct))
        .route(
            "/api/conversations/:id/mark_read",
            post(conversations::mark_read),
        )
        .route(
            "/api/conversations/:id/unread_count",
            get(conversations::unread_count),
        )
        // Messages
        .route("/api/messages", get(messages::list).post(messages::send))
        // Realtime
        .route("/ws/conversations/:id", get(ws::conversation_socket))
        // Apply middleware (order matters - last added runs first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .into_inner(),
        )
        .with_state(app_context)
}
