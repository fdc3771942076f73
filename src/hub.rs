// ============================================================================
// Realtime Hub
// ============================================================================
//
// Per-conversation broadcast groups. Each live connection that has passed
// the membership guard holds a receiver for its conversation's channel;
// publishing fans the event out to every receiver, including other
// connections belonging to the same user. Delivery is best-effort and
// in-process: a receiver that lags past the channel capacity loses the
// overflowed events, and a closed receiver is dropped silently.
//
// Publication happens strictly after the store confirms the write, so
// subscribers observe messages in commit order within one conversation.
//
// ============================================================================

use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use crate::message::ServerEvent;

pub struct RealtimeHub {
    groups: RwLock<HashMap<i64, broadcast::Sender<ServerEvent>>>,
    capacity: usize,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Registers a connection in the conversation's broadcast group
    pub async fn join(&self, conversation_id: i64) -> broadcast::Receiver<ServerEvent> {
        let mut groups = self.groups.write().await;
        groups
            .entry(conversation_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Fans an event out to the conversation's group. Returns how many
    /// connections received it; zero when nobody is connected.
    pub async fn publish(&self, conversation_id: i64, event: ServerEvent) -> usize {
        let groups = self.groups.read().await;
        match groups.get(&conversation_id) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drops the group's channel once the last receiver is gone. Callers
    /// invoke this after releasing their receiver.
    pub async fn leave(&self, conversation_id: i64) {
        let mut groups = self.groups.write().await;
        if let Some(tx) = groups.get(&conversation_id) {
            if tx.receiver_count() == 0 {
                groups.remove(&conversation_id);
            }
        }
    }

    /// Live connections currently joined to the conversation
    pub async fn group_size(&self, conversation_id: i64) -> usize {
        let groups = self.groups.read().await;
        groups
            .get(&conversation_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}
