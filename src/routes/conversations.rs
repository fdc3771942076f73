// ============================================================================
// Conversation Routes
// ============================================================================
//
// Endpoints:
// - POST /api/conversations/direct - Get or create the direct conversation
//   with another user (201 created / 200 reused)
// - POST /api/conversations - Create a conversation; group or direct
// - GET  /api/conversations - List the caller's conversations
// - POST /api/conversations/:id/mark_read - Advance the read cursor
// - GET  /api/conversations/:id/unread_count - Caller's unread count
//
// ============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectRequest {
    pub other_user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub title: Option<String>,
    pub participant_ids: Vec<Uuid>,
}

/// POST /api/conversations/direct
/// Returns 201 with the conversation when this call created it, 200 when an
/// existing one was reused.
pub async fn create_direct(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateDirectRequest>,
) -> AppResult<impl IntoResponse> {
    let (summary, created) = ctx
        .registry
        .get_or_create_direct(user.0, req.other_user_id)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}

/// POST /api/conversations
/// Group creation, or the direct get-or-create path when `isGroup` is false
/// (exactly one participant id required in that case).
pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateConversationRequest>,
) -> AppResult<impl IntoResponse> {
    if req.is_group {
        let summary = ctx
            .registry
            .create_group(user.0, req.title.as_deref(), &req.participant_ids)
            .await?;
        Ok((StatusCode::CREATED, Json(summary)))
    } else {
        let others: Vec<Uuid> = req
            .participant_ids
            .iter()
            .copied()
            .filter(|id| *id != user.0)
            .collect();
        if others.len() != 1 {
            return Err(AppError::validation(
                "a direct conversation requires exactly one other participant id",
            ));
        }
        let (summary, created) = ctx.registry.get_or_create_direct(user.0, others[0]).await?;
        let status = if created {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        Ok((status, Json(summary)))
    }
}

/// GET /api/conversations
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let summaries = ctx.registry.list_for_user(user.0).await?;
    Ok(Json(summaries))
}

/// POST /api/conversations/:id/mark_read
pub async fn mark_read(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(conversation_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let last_read_at = ctx.registry.mark_read(conversation_id, user.0).await?;
    Ok(Json(json!({
        "status": "ok",
        "lastReadAt": last_read_at,
    })))
}

/// GET /api/conversations/:id/unread_count
pub async fn unread_count(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Path(conversation_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let count = ctx.registry.unread_count(conversation_id, user.0).await?;
    Ok(Json(json!({ "unreadCount": count })))
}
