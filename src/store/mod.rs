// ============================================================================
// Persistence Layer
// ============================================================================
//
// `ChatStore` is the repository interface the rest of the system consumes.
// Two implementations:
// - postgres: PgStore, the production store (sqlx/PostgreSQL)
// - memory: MemoryStore, dependency-free store used by the test suites
//
// Transactional invariants (atomic direct-conversation creation, atomic
// message insert + freshness bump) live behind this interface so callers
// never see a half-applied write.
//
// ============================================================================

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, MessageRecord, ParticipantInfo, UserLite};

#[async_trait]
pub trait ChatStore: Send + Sync {
    // ===== Users (external entities; minimal surface) =====

    async fn create_user(&self, username: &str) -> AppResult<UserLite>;

    async fn get_user(&self, id: Uuid) -> AppResult<Option<UserLite>>;

    // ===== Conversations & participants =====

    /// Single indexed lookup backing the membership guard
    async fn is_participant(&self, conversation_id: i64, user_id: Uuid) -> AppResult<bool>;

    /// Finds the `direct` conversation whose participant set is exactly
    /// `{a, b}`. The participant count is checked, not merely containment.
    async fn find_direct_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>>;

    /// Atomically creates a direct conversation plus both participant rows.
    /// Returns `Conflict` if a matching conversation already exists at
    /// insert time (concurrent creation race); callers recover by
    /// re-fetching the winner.
    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation>;

    /// Atomically creates a group conversation with the given members.
    /// `creator` is always a member and flagged admin.
    async fn create_group(
        &self,
        creator: Uuid,
        title: Option<&str>,
        members: &[Uuid],
    ) -> AppResult<Conversation>;

    async fn get_conversation(&self, id: i64) -> AppResult<Option<Conversation>>;

    /// Conversations the user participates in, ordered by
    /// `last_activity_at` DESC (nulls last), then id DESC.
    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    async fn participants_of(&self, conversation_id: i64) -> AppResult<Vec<ParticipantInfo>>;

    // ===== Cursors & presence =====

    /// Advances `last_read_at` monotonically (never regresses on stale
    /// clocks). Returns the stored value, `None` when no participant row
    /// matched.
    async fn advance_last_read(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>>;

    /// Monotonic `last_seen_at` bump; missing participant rows are a no-op
    async fn touch_last_seen(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Messages from other senders strictly after the participant's
    /// `last_read_at` (unset cursor counts everything from others)
    async fn unread_count(&self, conversation_id: i64, user_id: Uuid) -> AppResult<i64>;

    // ===== Messages =====

    /// Inserts a message and bumps the conversation's `last_activity_at` to
    /// the message's timestamp in one transaction.
    async fn insert_message(
        &self,
        conversation_id: i64,
        sender_id: Uuid,
        content: &str,
        parent_id: Option<i64>,
    ) -> AppResult<MessageRecord>;

    async fn get_message(&self, id: i64) -> AppResult<Option<MessageRecord>>;

    /// Ascending by `(created_at, id)`
    async fn list_messages(&self, conversation_id: i64) -> AppResult<Vec<MessageRecord>>;

    async fn latest_message(&self, conversation_id: i64) -> AppResult<Option<MessageRecord>>;

    // ===== Liveness =====

    async fn ping(&self) -> AppResult<()>;
}
