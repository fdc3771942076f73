use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationKind, MessageRecord, ParticipantInfo, UserLite};
use crate::store::ChatStore;

pub type DbPool = Pool<Postgres>;

pub async fn create_pool(config: &Config) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .acquire_timeout(Duration::from_secs(config.db.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.db.idle_timeout_secs))
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Classifies driver errors into the application taxonomy.
/// Deadlocks, serialization failures and pool timeouts are transient;
/// unique violations become conflicts; FK violations mean a referenced
/// entity is gone.
fn classify(e: sqlx::Error) -> AppError {
    if matches!(e, sqlx::Error::PoolTimedOut) {
        return AppError::TransientStore("connection pool timed out".to_string());
    }
    if let sqlx::Error::Database(ref db) = e {
        let code = db.code().map(|c| c.to_string());
        match code.as_deref() {
            Some("40001") | Some("40P01") => {
                return AppError::TransientStore(db.message().to_string());
            }
            Some("23505") => return AppError::Conflict(db.message().to_string()),
            Some("23503") => {
                return AppError::NotFound("referenced entity does not exist".to_string());
            }
            _ => {}
        }
    }
    AppError::Database(e)
}

/// Advisory lock key for a user pair, independent of argument order
fn pair_lock_key(a: Uuid, b: Uuid) -> i64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut key: i64 = 0;
    for byte in lo.as_bytes().iter().chain(hi.as_bytes()) {
        key = key.wrapping_mul(31).wrapping_add(*byte as i64);
    }
    key
}

// Row projections for queries joining in the sender/member user record

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    conversation_id: i64,
    sender_id: Uuid,
    sender_username: String,
    content: String,
    parent_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for MessageRecord {
    fn from(row: MessageRow) -> Self {
        MessageRecord {
            id: row.id,
            conversation_id: row.conversation_id,
            sender: UserLite {
                id: row.sender_id,
                username: row.sender_username,
            },
            content: row.content,
            parent_id: row.parent_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    user_id: Uuid,
    username: String,
    is_admin: bool,
    joined_at: DateTime<Utc>,
    last_read_at: Option<DateTime<Utc>>,
    last_seen_at: Option<DateTime<Utc>>,
}

impl From<ParticipantRow> for ParticipantInfo {
    fn from(row: ParticipantRow) -> Self {
        ParticipantInfo {
            user: UserLite {
                id: row.user_id,
                username: row.username,
            },
            is_admin: row.is_admin,
            joined_at: row.joined_at,
            last_read_at: row.last_read_at,
            last_seen_at: row.last_seen_at,
        }
    }
}

const SELECT_MESSAGE: &str = r#"
    SELECT m.id, m.conversation_id, m.sender_id, u.username AS sender_username,
           m.content, m.parent_id, m.created_at
    FROM messages m
    JOIN users u ON u.id = m.sender_id
"#;

const FIND_DIRECT: &str = r#"
    SELECT c.id, c.kind, c.title, c.created_at, c.last_activity_at
    FROM conversations c
    WHERE c.kind = 'direct'
      AND EXISTS (
          SELECT 1 FROM conversation_participants
          WHERE conversation_id = c.id AND user_id = $1
      )
      AND EXISTS (
          SELECT 1 FROM conversation_participants
          WHERE conversation_id = c.id AND user_id = $2
      )
      AND (
          SELECT COUNT(*) FROM conversation_participants
          WHERE conversation_id = c.id
      ) = 2
    ORDER BY c.id
    LIMIT 1
"#;

#[async_trait]
impl ChatStore for PgStore {
    async fn create_user(&self, username: &str) -> AppResult<UserLite> {
        sqlx::query_as::<_, UserLite>(
            r#"
            INSERT INTO users (username)
            VALUES ($1)
            RETURNING id, username
            "#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<UserLite>> {
        sqlx::query_as::<_, UserLite>(
            r#"
            SELECT id, username
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn is_participant(&self, conversation_id: i64, user_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM conversation_participants
                WHERE conversation_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(exists)
    }

    async fn find_direct_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        sqlx::query_as::<_, Conversation>(FIND_DIRECT)
            .bind(a)
            .bind(b)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // Serializes concurrent creation for this pair across all server
        // instances; released at commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(pair_lock_key(a, b))
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let existing = sqlx::query_as::<_, Conversation>(FIND_DIRECT)
            .bind(a)
            .bind(b)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;
        if existing.is_some() {
            return Err(AppError::Conflict(
                "direct conversation already exists for this pair".to_string(),
            ));
        }

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (kind)
            VALUES ($1)
            RETURNING id, kind, title, created_at, last_activity_at
            "#,
        )
        .bind(ConversationKind::Direct)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id)
            VALUES ($1, $2), ($1, $3)
            "#,
        )
        .bind(conversation.id)
        .bind(a)
        .bind(b)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(conversation)
    }

    async fn create_group(
        &self,
        creator: Uuid,
        title: Option<&str>,
        members: &[Uuid],
    ) -> AppResult<Conversation> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (kind, title)
            VALUES ($1, $2)
            RETURNING id, kind, title, created_at, last_activity_at
            "#,
        )
        .bind(ConversationKind::Group)
        .bind(title)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, is_admin)
            VALUES ($1, $2, TRUE)
            "#,
        )
        .bind(conversation.id)
        .bind(creator)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        for member in members {
            sqlx::query(
                r#"
                INSERT INTO conversation_participants (conversation_id, user_id)
                VALUES ($1, $2)
                ON CONFLICT (conversation_id, user_id) DO NOTHING
                "#,
            )
            .bind(conversation.id)
            .bind(member)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        tx.commit().await.map_err(classify)?;
        Ok(conversation)
    }

    async fn get_conversation(&self, id: i64) -> AppResult<Option<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, kind, title, created_at, last_activity_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        sqlx::query_as::<_, Conversation>(
            r#"
            SELECT c.id, c.kind, c.title, c.created_at, c.last_activity_at
            FROM conversations c
            JOIN conversation_participants p ON p.conversation_id = c.id
            WHERE p.user_id = $1
            ORDER BY c.last_activity_at DESC NULLS LAST, c.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn participants_of(&self, conversation_id: i64) -> AppResult<Vec<ParticipantInfo>> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT p.user_id, u.username, p.is_admin, p.joined_at,
                   p.last_read_at, p.last_seen_at
            FROM conversation_participants p
            JOIN users u ON u.id = p.user_id
            WHERE p.conversation_id = $1
            ORDER BY p.joined_at, p.id
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(ParticipantInfo::from).collect())
    }

    async fn advance_last_read(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        sqlx::query_scalar(
            r#"
            UPDATE conversation_participants
            SET last_read_at = GREATEST(COALESCE(last_read_at, 'epoch'::timestamptz), $3)
            WHERE conversation_id = $1 AND user_id = $2
            RETURNING last_read_at
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn touch_last_seen(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET last_seen_at = GREATEST(COALESCE(last_seen_at, 'epoch'::timestamptz), $3)
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn unread_count(&self, conversation_id: i64, user_id: Uuid) -> AppResult<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages m
            WHERE m.conversation_id = $1
              AND m.sender_id <> $2
              AND m.created_at > COALESCE(
                  (SELECT last_read_at FROM conversation_participants
                   WHERE conversation_id = $1 AND user_id = $2),
                  'epoch'::timestamptz
              )
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn insert_message(
        &self,
        conversation_id: i64,
        sender_id: Uuid,
        content: &str,
        parent_id: Option<i64>,
    ) -> AppResult<MessageRecord> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // Timestamp is clamped to the conversation's freshness so ordering
        // stays monotonic per conversation even under clock skew; equal
        // timestamps are tie-broken by id downstream.
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            WITH inserted AS (
                INSERT INTO messages (conversation_id, sender_id, content, parent_id, created_at)
                VALUES ($1, $2, $3, $4, GREATEST(
                    now(),
                    COALESCE((SELECT last_activity_at FROM conversations WHERE id = $1), now())
                ))
                RETURNING id, conversation_id, sender_id, content, parent_id, created_at
            )
            SELECT i.id, i.conversation_id, i.sender_id, u.username AS sender_username,
                   i.content, i.parent_id, i.created_at
            FROM inserted i
            JOIN users u ON u.id = i.sender_id
            "#,
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .bind(parent_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let updated = sqlx::query(
            r#"
            UPDATE conversations
            SET last_activity_at = $2
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;
        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("conversation does not exist"));
        }

        tx.commit().await.map_err(classify)?;
        Ok(MessageRecord::from(row))
    }

    async fn get_message(&self, id: i64) -> AppResult<Option<MessageRecord>> {
        let sql = format!("{SELECT_MESSAGE} WHERE m.id = $1");
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.map(MessageRecord::from))
    }

    async fn list_messages(&self, conversation_id: i64) -> AppResult<Vec<MessageRecord>> {
        let sql = format!(
            "{SELECT_MESSAGE} WHERE m.conversation_id = $1 ORDER BY m.created_at, m.id"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        Ok(rows.into_iter().map(MessageRecord::from).collect())
    }

    async fn latest_message(&self, conversation_id: i64) -> AppResult<Option<MessageRecord>> {
        let sql = format!(
            "{SELECT_MESSAGE} WHERE m.conversation_id = $1 ORDER BY m.created_at DESC, m.id DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.map(MessageRecord::from))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
