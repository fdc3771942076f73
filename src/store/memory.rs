use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationKind, MessageRecord, ParticipantInfo, UserLite};
use crate::store::ChatStore;

#[derive(Debug, Clone)]
struct MemParticipant {
    conversation_id: i64,
    user_id: Uuid,
    is_admin: bool,
    joined_at: DateTime<Utc>,
    last_read_at: Option<DateTime<Utc>>,
    last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct MemMessage {
    id: i64,
    conversation_id: i64,
    sender_id: Uuid,
    content: String,
    parent_id: Option<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemInner {
    users: HashMap<Uuid, UserLite>,
    conversations: HashMap<i64, Conversation>,
    participants: Vec<MemParticipant>,
    messages: Vec<MemMessage>,
    next_conversation_id: i64,
    next_message_id: i64,
}

impl MemInner {
    fn next_conversation_id(&mut self) -> i64 {
        self.next_conversation_id += 1;
        self.next_conversation_id
    }

    fn next_message_id(&mut self) -> i64 {
        self.next_message_id += 1;
        self.next_message_id
    }

    fn member_count(&self, conversation_id: i64) -> usize {
        self.participants
            .iter()
            .filter(|p| p.conversation_id == conversation_id)
            .count()
    }

    fn has_member(&self, conversation_id: i64, user_id: Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.conversation_id == conversation_id && p.user_id == user_id)
    }

    fn find_direct(&self, a: Uuid, b: Uuid) -> Option<Conversation> {
        let mut matches: Vec<&Conversation> = self
            .conversations
            .values()
            .filter(|c| {
                c.kind == ConversationKind::Direct
                    && self.has_member(c.id, a)
                    && self.has_member(c.id, b)
                    && self.member_count(c.id) == 2
            })
            .collect();
        matches.sort_by_key(|c| c.id);
        matches.first().map(|c| (*c).clone())
    }

    fn record_for(&self, msg: &MemMessage) -> AppResult<MessageRecord> {
        let sender = self
            .users
            .get(&msg.sender_id)
            .cloned()
            .ok_or_else(|| AppError::internal("message sender missing from store"))?;
        Ok(MessageRecord {
            id: msg.id,
            conversation_id: msg.conversation_id,
            sender,
            content: msg.content.clone(),
            parent_id: msg.parent_id,
            created_at: msg.created_at,
        })
    }
}

/// In-memory store used by the test suites. Implements the same
/// transactional contracts as `PgStore` by holding its single write lock
/// across each multi-step mutation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_user(&self, username: &str) -> AppResult<UserLite> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.username == username) {
            return Err(AppError::Conflict(format!(
                "username {username} already exists"
            )));
        }
        let user = UserLite {
            id: Uuid::new_v4(),
            username: username.to_string(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<UserLite>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn is_participant(&self, conversation_id: i64, user_id: Uuid) -> AppResult<bool> {
        Ok(self.inner.read().await.has_member(conversation_id, user_id))
    }

    async fn find_direct_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().await.find_direct(a, b))
    }

    async fn create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        let mut inner = self.inner.write().await;
        if inner.find_direct(a, b).is_some() {
            return Err(AppError::Conflict(
                "direct conversation already exists for this pair".to_string(),
            ));
        }
        let now = Utc::now();
        let id = inner.next_conversation_id();
        let conversation = Conversation {
            id,
            kind: ConversationKind::Direct,
            title: None,
            created_at: now,
            last_activity_at: None,
        };
        inner.conversations.insert(id, conversation.clone());
        for user_id in [a, b] {
            inner.participants.push(MemParticipant {
                conversation_id: id,
                user_id,
                is_admin: false,
                joined_at: now,
                last_read_at: None,
                last_seen_at: None,
            });
        }
        Ok(conversation)
    }

    async fn create_group(
        &self,
        creator: Uuid,
        title: Option<&str>,
        members: &[Uuid],
    ) -> AppResult<Conversation> {
        let mut inner = self.inner.write().await;
        for member in members {
            if !inner.users.contains_key(member) {
                return Err(AppError::not_found("referenced entity does not exist"));
            }
        }
        let now = Utc::now();
        let id = inner.next_conversation_id();
        let conversation = Conversation {
            id,
            kind: ConversationKind::Group,
            title: title.map(str::to_string),
            created_at: now,
            last_activity_at: None,
        };
        inner.conversations.insert(id, conversation.clone());
        inner.participants.push(MemParticipant {
            conversation_id: id,
            user_id: creator,
            is_admin: true,
            joined_at: now,
            last_read_at: None,
            last_seen_at: None,
        });
        for member in members {
            if *member == creator || inner.has_member(id, *member) {
                continue;
            }
            inner.participants.push(MemParticipant {
                conversation_id: id,
                user_id: *member,
                is_admin: false,
                joined_at: now,
                last_read_at: None,
                last_seen_at: None,
            });
        }
        Ok(conversation)
    }

    async fn get_conversation(&self, id: i64) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let inner = self.inner.read().await;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| inner.has_member(c.id, user_id))
            .cloned()
            .collect();
        // last_activity_at DESC with nulls last, then id DESC
        conversations.sort_by(|a, b| match (&a.last_activity_at, &b.last_activity_at) {
            (Some(x), Some(y)) => y.cmp(x).then(b.id.cmp(&a.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.id.cmp(&a.id),
        });
        Ok(conversations)
    }

    async fn participants_of(&self, conversation_id: i64) -> AppResult<Vec<ParticipantInfo>> {
        let inner = self.inner.read().await;
        let mut infos = Vec::new();
        for p in inner
            .participants
            .iter()
            .filter(|p| p.conversation_id == conversation_id)
        {
            let user = inner
                .users
                .get(&p.user_id)
                .cloned()
                .ok_or_else(|| AppError::internal("participant user missing from store"))?;
            infos.push(ParticipantInfo {
                user,
                is_admin: p.is_admin,
                joined_at: p.joined_at,
                last_read_at: p.last_read_at,
                last_seen_at: p.last_seen_at,
            });
        }
        Ok(infos)
    }

    async fn advance_last_read(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let mut inner = self.inner.write().await;
        let Some(p) = inner
            .participants
            .iter_mut()
            .find(|p| p.conversation_id == conversation_id && p.user_id == user_id)
        else {
            return Ok(None);
        };
        let advanced = p.last_read_at.map_or(at, |cur| cur.max(at));
        p.last_read_at = Some(advanced);
        Ok(Some(advanced))
    }

    async fn touch_last_seen(
        &self,
        conversation_id: i64,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(p) = inner
            .participants
            .iter_mut()
            .find(|p| p.conversation_id == conversation_id && p.user_id == user_id)
        {
            p.last_seen_at = Some(p.last_seen_at.map_or(at, |cur| cur.max(at)));
        }
        Ok(())
    }

    async fn unread_count(&self, conversation_id: i64, user_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.read().await;
        let last_read = inner
            .participants
            .iter()
            .find(|p| p.conversation_id == conversation_id && p.user_id == user_id)
            .and_then(|p| p.last_read_at);
        let count = inner
            .messages
            .iter()
            .filter(|m| {
                m.conversation_id == conversation_id
                    && m.sender_id != user_id
                    && last_read.map_or(true, |cursor| m.created_at > cursor)
            })
            .count();
        Ok(count as i64)
    }

    async fn insert_message(
        &self,
        conversation_id: i64,
        sender_id: Uuid,
        content: &str,
        parent_id: Option<i64>,
    ) -> AppResult<MessageRecord> {
        let mut inner = self.inner.write().await;
        let Some(conversation) = inner.conversations.get(&conversation_id).cloned() else {
            return Err(AppError::not_found("conversation does not exist"));
        };
        if !inner.users.contains_key(&sender_id) {
            return Err(AppError::not_found("referenced entity does not exist"));
        }

        // Monotonic per conversation: never earlier than the current freshness
        let now = Utc::now();
        let created_at = conversation
            .last_activity_at
            .map_or(now, |last| last.max(now));

        let id = inner.next_message_id();
        let message = MemMessage {
            id,
            conversation_id,
            sender_id,
            content: content.to_string(),
            parent_id,
            created_at,
        };
        let record = inner.record_for(&message)?;
        inner.messages.push(message);
        if let Some(c) = inner.conversations.get_mut(&conversation_id) {
            c.last_activity_at = Some(created_at);
        }
        Ok(record)
    }

    async fn get_message(&self, id: i64) -> AppResult<Option<MessageRecord>> {
        let inner = self.inner.read().await;
        inner
            .messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| inner.record_for(m))
            .transpose()
    }

    async fn list_messages(&self, conversation_id: i64) -> AppResult<Vec<MessageRecord>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<&MemMessage> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        messages.into_iter().map(|m| inner.record_for(m)).collect()
    }

    async fn latest_message(&self, conversation_id: i64) -> AppResult<Option<MessageRecord>> {
        let inner = self.inner.read().await;
        inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|m| inner.record_for(m))
            .transpose()
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
