// ============================================================================
// WebSocket Route
// ============================================================================
//
// GET /ws/conversations/:id upgrades to the conversation's live socket.
// Identity comes from the Authorization header or, for browser clients that
// cannot set WebSocket headers, a `token` query parameter. The token is
// resolved before the upgrade completes; the outcome drives the close code
// the connection loop emits (4401 unauthenticated, 4403 forbidden).
//
// ============================================================================

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::handlers;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws/conversations/:id
pub async fn conversation_socket(
    State(ctx): State<Arc<AppContext>>,
    Path(conversation_id): Path<i64>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = resolve_identity(&ctx, &headers, query.token.as_deref());
    ws.on_upgrade(move |socket| {
        handlers::handle_socket(socket, ctx, conversation_id, identity)
    })
}

fn resolve_identity(
    ctx: &AppContext,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Option<Uuid> {
    let header_token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let token = header_token.or(query_token)?;
    match ctx.auth.resolve_user(token) {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket token rejected");
            None
        }
    }
}
