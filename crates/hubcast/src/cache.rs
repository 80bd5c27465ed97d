//! Client-side message cache with id-keyed dedupe.
//!
//! Push frames and catch-up fetches overlap after a reconnect; merging through
//! this cache guarantees each message id is surfaced at most once, and the
//! highest id doubles as the catch-up cursor.

use std::collections::BTreeMap;

use crate::types::Message;

#[derive(Debug, Default)]
pub struct MessageCache {
    by_id: BTreeMap<i64, Message>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single message. Returns false if the id was already present.
    pub fn insert(&mut self, message: Message) -> bool {
        match self.by_id.entry(message.id) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(message);
                true
            }
        }
    }

    /// Merge a batch, returning only the messages that were new, in ascending
    /// id order. Applying the same batch twice returns nothing the second time.
    pub fn merge(&mut self, batch: Vec<Message>) -> Vec<Message> {
        let mut fresh: Vec<Message> = batch
            .into_iter()
            .filter(|message| self.insert(message.clone()))
            .collect();
        fresh.sort_by_key(|message| message.id);
        fresh
    }

    /// The catch-up cursor: highest id seen so far, 0 before any message.
    pub fn last_known_id(&self) -> i64 {
        self.by_id.keys().next_back().copied().unwrap_or(0)
    }

    /// All cached messages in ascending id order.
    pub fn messages(&self) -> Vec<Message> {
        self.by_id.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::MessageCache;
    use crate::types::{Message, MessageKind, Sender};

    fn message(id: i64) -> Message {
        Message {
            id,
            workspace_id: "ws-1".to_string(),
            sender: Sender::human("u-1"),
            content: format!("message {id}"),
            message_kind: MessageKind::Chat,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let mut cache = MessageCache::new();
        let batch = vec![message(1), message(2), message(3)];

        let first = cache.merge(batch.clone());
        assert_eq!(first.len(), 3);

        let second = cache.merge(batch);
        assert!(second.is_empty());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn merge_returns_only_fresh_ids_in_order() {
        let mut cache = MessageCache::new();
        cache.merge(vec![message(2)]);

        let fresh = cache.merge(vec![message(3), message(1), message(2)]);
        let ids: Vec<i64> = fresh.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn last_known_id_tracks_highest_seen() {
        let mut cache = MessageCache::new();
        assert_eq!(cache.last_known_id(), 0);

        cache.merge(vec![message(5), message(2)]);
        assert_eq!(cache.last_known_id(), 5);
    }

    #[test]
    fn messages_are_ordered_by_id() {
        let mut cache = MessageCache::new();
        cache.merge(vec![message(3), message(1), message(2)]);

        let ids: Vec<i64> = cache.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
