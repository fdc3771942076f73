// ============================================================================
// Axum Extractors
// ============================================================================
//
// - AuthenticatedUser: extracts and validates the bearer token from the
//   Authorization header and resolves it to a user id
//
// ============================================================================

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;

/// Extractor for the authenticated user id
///
/// Usage:
/// ```ignore
/// async fn handler(user: AuthenticatedUser, ...) -> Result<...> {
///     let user_id = user.0;
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = bearer_user(state, parts).map_err(|e| {
            tracing::warn!(error = %e, "Request authentication failed");
            let status = e.status_code();
            let body = json!({
                "error": e.user_message(),
                "error_code": e.error_code(),
            });
            (status, axum::Json(body)).into_response()
        })?;
        Ok(AuthenticatedUser(user_id))
    }
}

fn bearer_user(ctx: &AppContext, parts: &Parts) -> Result<Uuid, AppError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::auth("missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::auth("invalid Authorization header format"))?;

    ctx.auth.resolve_user(token)
}
