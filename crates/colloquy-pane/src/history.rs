//! History - the ordered message sequence for the active conversation

use bytes::Bytes;
use colloquy_api::{Message, MessageId};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Storage for the active conversation's messages, oldest first.
///
/// Unique by id: merge operations skip ids already held, so the relative
/// order of surviving messages never changes. Mutators report whether
/// anything changed, letting callers skip the paired scroll adjustment on
/// no-op inputs.
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Messages in display order with O(1) id-based access
    items: IndexMap<MessageId, Message>,
    /// Revision number for dirty tracking
    revision: u64,
}

impl History {
    /// Create an empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current revision number for dirty tracking
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current number of messages
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.items.get(&id)
    }

    /// Message at a display position, oldest first
    pub fn get_index(&self, index: usize) -> Option<&Message> {
        self.items.get_index(index).map(|(_, message)| message)
    }

    /// Id of the oldest message held, the cursor for older-page requests
    pub fn first_id(&self) -> Option<MessageId> {
        self.items.first().map(|(id, _)| *id)
    }

    /// Iterate over all messages in display order
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.items.values()
    }

    pub fn message_ids(&self) -> Vec<MessageId> {
        self.items.keys().copied().collect()
    }

    /// Discard everything and install `messages` as the new sequence.
    /// Used on conversation switch; switching to "no conversation" passes
    /// an empty vector.
    pub fn replace(&mut self, messages: Vec<Message>) -> bool {
        if self.items.is_empty() && messages.is_empty() {
            return false;
        }
        self.items.clear();
        for message in messages {
            self.items.entry(message.id).or_insert(message);
        }
        self.revision += 1;
        true
    }

    /// Insert older messages before the existing sequence, keeping the
    /// incoming batch's order. Ids already held are skipped.
    pub fn prepend(&mut self, messages: Vec<Message>) -> bool {
        if messages.is_empty() {
            return false;
        }
        let mut merged: IndexMap<MessageId, Message> =
            IndexMap::with_capacity(messages.len() + self.items.len());
        for message in messages {
            if !self.items.contains_key(&message.id) {
                merged.entry(message.id).or_insert(message);
            }
        }
        if merged.is_empty() {
            return false;
        }
        for (id, message) in self.items.drain(..) {
            merged.insert(id, message);
        }
        self.items = merged;
        self.revision += 1;
        true
    }

    /// Add newer messages after the existing sequence. Ids already held are
    /// skipped.
    pub fn append(&mut self, messages: Vec<Message>) -> bool {
        if messages.is_empty() {
            return false;
        }
        let mut changed = false;
        for message in messages {
            if !self.items.contains_key(&message.id) {
                self.items.insert(message.id, message);
                changed = true;
            }
        }
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// Remove every listed id. Survivors keep their relative order.
    pub fn delete_by_ids(&mut self, ids: &[MessageId]) -> bool {
        if self.items.is_empty() || ids.is_empty() {
            return false;
        }
        let doomed: HashSet<MessageId> = ids.iter().copied().collect();
        let before = self.items.len();
        self.items.retain(|id, _| !doomed.contains(id));
        let changed = self.items.len() != before;
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// Write a fetched payload into the message holding `cache_key`.
    /// One-way: an already populated reference is left alone.
    pub fn populate_file(&mut self, id: MessageId, cache_key: &str, blob: &Bytes) -> bool {
        let Some(message) = self.items.get_mut(&id) else {
            return false;
        };
        let Some(file) = message.content.file_ref_by_key_mut(cache_key) else {
            return false;
        };
        if file.is_loaded() {
            return false;
        }
        file.payload = Some(blob.clone());
        self.revision += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_api::{ChatId, MessageContent};

    fn message(id: i64) -> Message {
        Message {
            id: MessageId(id),
            chat_id: ChatId(1),
            is_outgoing: false,
            date: 1_700_000_000 + id,
            sending_state: None,
            content: MessageContent::Text {
                text: format!("message {id}"),
            },
        }
    }

    fn ids(history: &History) -> Vec<i64> {
        history.iter().map(|message| message.id.0).collect()
    }

    #[test]
    fn prepend_and_append_keep_order_and_dedup() {
        let mut history = History::new();
        assert!(history.replace(vec![message(10), message(11), message(12)]));

        // Page of older messages, one already held.
        assert!(history.prepend(vec![message(8), message(9), message(10)]));
        assert_eq!(ids(&history), vec![8, 9, 10, 11, 12]);

        // Duplicate push arrival changes nothing.
        assert!(!history.append(vec![message(12)]));
        assert!(history.append(vec![message(13)]));
        assert_eq!(ids(&history), vec![8, 9, 10, 11, 12, 13]);
    }

    #[test]
    fn empty_inputs_are_no_ops() {
        let mut history = History::new();
        let revision = history.revision();
        assert!(!history.prepend(vec![]));
        assert!(!history.append(vec![]));
        assert!(!history.delete_by_ids(&[]));
        assert!(!history.replace(vec![]));
        assert_eq!(history.revision(), revision);
    }

    #[test]
    fn prepend_of_only_duplicates_is_a_no_op() {
        let mut history = History::new();
        history.replace(vec![message(1), message(2)]);
        let revision = history.revision();
        assert!(!history.prepend(vec![message(1), message(2)]));
        assert_eq!(history.revision(), revision);
    }

    #[test]
    fn delete_filters_without_reordering() {
        let mut history = History::new();
        history.replace(vec![message(1), message(2), message(3), message(4)]);
        assert!(history.delete_by_ids(&[MessageId(2), MessageId(4), MessageId(99)]));
        assert_eq!(ids(&history), vec![1, 3]);

        let revision = history.revision();
        assert!(!history.delete_by_ids(&[MessageId(99)]));
        assert_eq!(history.revision(), revision);
    }

    #[test]
    fn replace_with_empty_clears_but_empty_to_empty_is_no_op() {
        let mut history = History::new();
        history.replace(vec![message(1)]);
        assert!(history.replace(vec![]));
        assert!(history.is_empty());
        assert!(!history.replace(vec![]));
    }

    #[test]
    fn within_batch_duplicates_keep_first_occurrence() {
        let mut history = History::new();
        let mut renamed = message(5);
        if let MessageContent::Text { text } = &mut renamed.content {
            *text = "second copy".to_string();
        }
        assert!(history.append(vec![message(5), renamed]));
        assert_eq!(history.len(), 1);
        assert_eq!(
            history.get(MessageId(5)).map(|m| m.content.clone()),
            Some(MessageContent::Text {
                text: "message 5".to_string()
            })
        );
    }

    #[test]
    fn first_id_is_the_oldest() {
        let mut history = History::new();
        history.replace(vec![message(7), message(8)]);
        history.prepend(vec![message(5), message(6)]);
        assert_eq!(history.first_id(), Some(MessageId(5)));
    }
}
