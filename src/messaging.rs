// ============================================================================
// Message Store
// ============================================================================
//
// Append-only message creation and listing. The core invariant lives in the
// persistence layer: a message insert and its conversation's
// last_activity_at bump commit in one transaction, so a successful send is
// always reflected in the conversation list. The hub is notified only after
// that commit.
//
// ============================================================================

use std::sync::Arc;
use uuid::Uuid;

use crate::config::MAX_MESSAGE_CONTENT_CHARS;
use crate::error::{AppError, AppResult};
use crate::guard::{ensure_participant, retry_read};
use crate::hub::RealtimeHub;
use crate::message::ServerEvent;
use crate::models::MessageRecord;
use crate::store::ChatStore;

pub struct MessageService {
    store: Arc<dyn ChatStore>,
    hub: Arc<RealtimeHub>,
}

impl MessageService {
    pub fn new(store: Arc<dyn ChatStore>, hub: Arc<RealtimeHub>) -> Self {
        Self { store, hub }
    }

    /// Appends a message to a conversation and fans it out to live group
    /// members. `parent_id` links a reply and must reference a message in
    /// the same conversation.
    pub async fn send(
        &self,
        conversation_id: i64,
        sender_id: Uuid,
        content: &str,
        parent_id: Option<i64>,
    ) -> AppResult<MessageRecord> {
        ensure_participant(self.store.as_ref(), conversation_id, sender_id).await?;

        if content.chars().count() > MAX_MESSAGE_CONTENT_CHARS {
            return Err(AppError::validation(format!(
                "message content exceeds {} characters",
                MAX_MESSAGE_CONTENT_CHARS
            )));
        }

        if let Some(parent) = parent_id {
            let parent_message = self
                .store
                .get_message(parent)
                .await?
                .ok_or_else(|| AppError::validation("parent message does not exist"))?;
            if parent_message.conversation_id != conversation_id {
                return Err(AppError::validation(
                    "parent message belongs to a different conversation",
                ));
            }
        }

        let message = self
            .store
            .insert_message(conversation_id, sender_id, content, parent_id)
            .await?;

        // Broadcast strictly after the store confirmed the write, so
        // subscribers observe commit order.
        let delivered = self
            .hub
            .publish(
                conversation_id,
                ServerEvent::MessageCreated {
                    message: message.clone(),
                },
            )
            .await;
        tracing::debug!(
            message_id = message.id,
            conversation_id = conversation_id,
            delivered = delivered,
            "Message stored and broadcast"
        );

        Ok(message)
    }

    /// Messages of a conversation, ascending by creation time then id
    pub async fn list(
        &self,
        conversation_id: i64,
        requester_id: Uuid,
    ) -> AppResult<Vec<MessageRecord>> {
        ensure_participant(self.store.as_ref(), conversation_id, requester_id).await?;
        retry_read(|| self.store.list_messages(conversation_id)).await
    }
}
