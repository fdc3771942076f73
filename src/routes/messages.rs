// ============================================================================
// Message Routes
// ============================================================================
//
// Endpoints:
// - POST /api/messages - Send a message, addressed either to an existing
//   conversation or to a recipient (implicit direct-conversation creation)
// - GET  /api/messages?conversationId= - List a conversation's messages
//
// ============================================================================

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: Option<i64>,
    pub recipient_id: Option<Uuid>,
    pub content: String,
    pub parent_message_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    pub conversation_id: i64,
}

/// POST /api/messages
/// Exactly one addressing mode is accepted: `conversationId` targets an
/// existing conversation, `recipientId` resolves (or creates) the direct
/// conversation with that user first.
pub async fn send(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<impl IntoResponse> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(AppError::validation("message content must not be empty"));
    }

    let conversation_id = match (req.conversation_id, req.recipient_id) {
        (Some(conversation_id), None) => conversation_id,
        (None, Some(recipient_id)) => {
            let (summary, _) = ctx
                .registry
                .get_or_create_direct(user.0, recipient_id)
                .await?;
            summary.conversation.id
        }
        _ => {
            return Err(AppError::validation(
                "provide either conversationId or recipientId",
            ));
        }
    };

    let message = ctx
        .messages
        .send(conversation_id, user.0, content, req.parent_message_id)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages?conversationId=
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    Query(query): Query<ListMessagesQuery>,
) -> AppResult<impl IntoResponse> {
    let messages = ctx.messages.list(query.conversation_id, user.0).await?;
    Ok(Json(messages))
}
