// ============================================================================
// WebSocket Connection Handling
// ============================================================================
//
// One task per live connection, driving the state machine
// Connecting -> Authenticated -> Joined -> Closed with a single select loop.
// Suspension points are the socket and the broadcast feed; everything else
// is straight-line code.
//
// A dropped connection has no resume protocol: clients reconnect and read
// missed messages through the HTTP list endpoint.
//
// ============================================================================

pub mod connection;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::Utc;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::context::AppContext;
use crate::guard;
use crate::message::ClientEvent;
use crate::store::ChatStore;
use connection::{
    ConnectionHandler, CLOSE_FORBIDDEN, CLOSE_INTERNAL_ERROR, CLOSE_UNAUTHENTICATED,
};

/// Drives one conversation socket from upgrade to teardown.
/// `identity` is the resolved token owner, or `None` when the token was
/// missing or invalid.
pub async fn handle_socket(
    socket: WebSocket,
    ctx: Arc<AppContext>,
    conversation_id: i64,
    identity: Option<Uuid>,
) {
    let (sink, mut receiver) = socket.split();
    let mut handler = ConnectionHandler::new(sink);

    // Connecting -> Closed: no usable identity
    let Some(user_id) = identity else {
        handler
            .close_with(CLOSE_UNAUTHENTICATED, "authentication required")
            .await;
        return;
    };
    handler.authenticate(user_id);

    // Authenticated -> Joined requires membership
    match guard::is_participant(ctx.store.as_ref(), conversation_id, user_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(conversation_id, "Rejected join attempt by non-participant");
            handler.close_with(CLOSE_FORBIDDEN, "not a participant").await;
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, conversation_id, "Membership check failed during join");
            handler
                .close_with(CLOSE_INTERNAL_ERROR, "membership check failed")
                .await;
            return;
        }
    }

    let mut feed = ctx.hub.join(conversation_id).await;
    handler.mark_joined();
    tracing::info!(conversation_id, user_id = %user_id, "Connection joined conversation group");

    // Presence bump on join; failure here must not reject the connection
    if let Err(e) = ctx
        .store
        .touch_last_seen(conversation_id, user_id, Utc::now())
        .await
    {
        tracing::warn!(error = %e, "Failed to update presence on join");
    }

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_client_event(&mut handler, &ctx, conversation_id, user_id, &text)
                            .await;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        handler.pong(data).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::info!(conversation_id, "Connection closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }

            event = feed.recv() => {
                match event {
                    Ok(event) => {
                        if handler.send_event(&event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Joined -> Closed: unsubscribe, then best-effort presence bump
    drop(feed);
    ctx.hub.leave(conversation_id).await;
    if let Err(e) = ctx
        .store
        .touch_last_seen(conversation_id, user_id, Utc::now())
        .await
    {
        tracing::warn!(error = %e, "Failed to update presence on disconnect");
    }
    tracing::info!(conversation_id, user_id = %user_id, "Connection closed");
}

async fn handle_client_event(
    handler: &mut ConnectionHandler,
    ctx: &AppContext,
    conversation_id: i64,
    user_id: Uuid,
    raw: &str,
) {
    match serde_json::from_str::<ClientEvent>(raw) {
        Ok(ClientEvent::MessageCreate { content, reply_to }) => {
            // Blank input is dropped without an error frame
            let Some(content) = normalized_content(&content) else {
                return;
            };
            match ctx
                .messages
                .send(conversation_id, user_id, content, reply_to)
                .await
            {
                // The service broadcasts after commit; this connection
                // receives its own message through the group feed.
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Inbound message rejected");
                    handler
                        .send_error(e.error_code(), &e.user_message())
                        .await;
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse client event");
            handler
                .send_error("INVALID_FORMAT", "Invalid event format")
                .await;
        }
    }
}

/// Trims inbound content; `None` means the event carries nothing to send
fn normalized_content(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
