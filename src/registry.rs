// ============================================================================
// Conversation Registry
// ============================================================================
//
// Owns conversation/participant lifecycle:
// - get-or-create direct conversations, deduplicated per unordered user pair
// - read-cursor (last_read_at) advancement, monotonic
// - unread counts
// - per-user conversation listing
// - group creation
//
// The direct-creation race is handled twice over: a per-pair async mutex
// serializes callers inside this process, and the store serializes creating
// transactions across processes. A race loser recovers the winner's row and
// reports `created = false`.
//
// ============================================================================

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::guard::{ensure_participant, retry_read};
use crate::models::{Conversation, ConversationSummary};
use crate::store::ChatStore;

pub struct ConversationRegistry {
    store: Arc<dyn ChatStore>,
    direct_locks: Mutex<HashMap<(Uuid, Uuid), Arc<Mutex<()>>>>,
}

impl ConversationRegistry {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            direct_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn pair_lock(&self, a: Uuid, b: Uuid) -> Arc<Mutex<()>> {
        let key = if a <= b { (a, b) } else { (b, a) };
        let mut locks = self.direct_locks.lock().await;
        locks.entry(key).or_default().clone()
    }

    /// Returns the direct conversation between the requester and the other
    /// user, creating it (with both participant rows, atomically) when none
    /// exists. The boolean reports whether this call created it.
    pub async fn get_or_create_direct(
        &self,
        requester_id: Uuid,
        other_user_id: Uuid,
    ) -> AppResult<(ConversationSummary, bool)> {
        if requester_id == other_user_id {
            return Err(AppError::validation(
                "cannot start a direct conversation with yourself",
            ));
        }
        if self.store.get_user(other_user_id).await?.is_none() {
            return Err(AppError::not_found("user does not exist"));
        }

        let lock = self.pair_lock(requester_id, other_user_id).await;
        let _guard = lock.lock().await;

        if let Some(existing) = self
            .store
            .find_direct_between(requester_id, other_user_id)
            .await?
        {
            let summary = self.summarize(existing, requester_id).await?;
            return Ok((summary, false));
        }

        match self.store.create_direct(requester_id, other_user_id).await {
            Ok(conversation) => {
                tracing::info!(
                    conversation_id = conversation.id,
                    "Direct conversation created"
                );
                let summary = self.summarize(conversation, requester_id).await?;
                Ok((summary, true))
            }
            // Race loser: another writer committed between our lookup and
            // insert. Hand back the winner's row.
            Err(AppError::Conflict(_)) => {
                let winner = self
                    .store
                    .find_direct_between(requester_id, other_user_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::internal("direct conversation vanished after creation conflict")
                    })?;
                let summary = self.summarize(winner, requester_id).await?;
                Ok((summary, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a group conversation. The creator is always a member and is
    /// flagged admin; duplicate participant ids (including the creator's)
    /// are dropped. Groups are never deduplicated.
    pub async fn create_group(
        &self,
        creator_id: Uuid,
        title: Option<&str>,
        participant_ids: &[Uuid],
    ) -> AppResult<ConversationSummary> {
        let mut members: Vec<Uuid> = Vec::new();
        for id in participant_ids {
            if *id != creator_id && !members.contains(id) {
                members.push(*id);
            }
        }
        if members.is_empty() {
            return Err(AppError::validation(
                "a group conversation needs at least one other participant",
            ));
        }
        for member in &members {
            if self.store.get_user(*member).await?.is_none() {
                return Err(AppError::not_found("user does not exist"));
            }
        }

        let conversation = self
            .store
            .create_group(creator_id, title, &members)
            .await?;
        tracing::info!(
            conversation_id = conversation.id,
            member_count = members.len() + 1,
            "Group conversation created"
        );
        self.summarize(conversation, creator_id).await
    }

    /// Advances the caller's read cursor to now and returns the stored
    /// value. Monotonic: a stale concurrent call can never move the cursor
    /// backwards, so repeated calls are idempotent.
    pub async fn mark_read(
        &self,
        conversation_id: i64,
        user_id: Uuid,
    ) -> AppResult<DateTime<Utc>> {
        ensure_participant(self.store.as_ref(), conversation_id, user_id).await?;
        self.store
            .advance_last_read(conversation_id, user_id, Utc::now())
            .await?
            // The row was just checked; losing it mid-flight means the
            // participant was removed concurrently.
            .ok_or_else(|| AppError::permission("not a participant"))
    }

    pub async fn unread_count(&self, conversation_id: i64, user_id: Uuid) -> AppResult<i64> {
        ensure_participant(self.store.as_ref(), conversation_id, user_id).await?;
        retry_read(|| self.store.unread_count(conversation_id, user_id)).await
    }

    /// All conversations the user participates in, most recently active
    /// first (conversations with no messages yet sort last, newest first),
    /// enriched with members, latest message and the caller's unread count.
    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<ConversationSummary>> {
        let conversations =
            retry_read(|| self.store.conversations_for_user(user_id)).await?;
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            summaries.push(self.summarize(conversation, user_id).await?);
        }
        Ok(summaries)
    }

    async fn summarize(
        &self,
        conversation: Conversation,
        viewer_id: Uuid,
    ) -> AppResult<ConversationSummary> {
        let participants = self.store.participants_of(conversation.id).await?;
        let last_message = self.store.latest_message(conversation.id).await?;
        let unread_count = self.store.unread_count(conversation.id, viewer_id).await?;
        Ok(ConversationSummary {
            conversation,
            participants,
            last_message,
            unread_count,
        })
    }
}
