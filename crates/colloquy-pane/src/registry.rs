//! Shared record registries scoped to the pane's lifetime.
//!
//! These replace process-wide stores: each is a cheap-to-clone handle over
//! shared state, handed to the pane at spawn time and to whichever shell
//! components need id-based lookups.

use bytes::Bytes;
use colloquy_api::{Chat, ChatId, Message, MessageId, User, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry of every message the pane has seen, keyed by id.
///
/// Pages and push arrivals are upserted before the display sequence mutates,
/// so id-based lookups resolve during the same observable update.
#[derive(Clone, Debug, Default)]
pub struct MessageIndex {
    messages: Arc<RwLock<HashMap<MessageId, Message>>>,
}

impl MessageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, message: &Message) {
        let mut messages = self.messages.write().await;
        messages.insert(message.id, message.clone());
    }

    pub async fn upsert_page(&self, page: &[Message]) {
        let mut messages = self.messages.write().await;
        for message in page {
            messages.insert(message.id, message.clone());
        }
    }

    pub async fn get(&self, id: MessageId) -> Option<Message> {
        let messages = self.messages.read().await;
        messages.get(&id).cloned()
    }

    pub async fn remove_ids(&self, ids: &[MessageId]) {
        let mut messages = self.messages.write().await;
        for id in ids {
            messages.remove(id);
        }
    }

    pub async fn len(&self) -> usize {
        let messages = self.messages.read().await;
        messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        let messages = self.messages.read().await;
        messages.is_empty()
    }

    /// Write a fetched payload into the registered copy. One-way: returns
    /// false if the reference is unknown or already populated.
    pub async fn populate_file(&self, id: MessageId, cache_key: &str, blob: &Bytes) -> bool {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.get_mut(&id) else {
            return false;
        };
        let Some(file) = message.content.file_ref_by_key_mut(cache_key) else {
            return false;
        };
        if file.is_loaded() {
            return false;
        }
        file.payload = Some(blob.clone());
        true
    }
}

/// Registry of user records, fed by push updates.
#[derive(Clone, Debug, Default)]
pub struct UserDirectory {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, user: &User) {
        let mut users = self.users.write().await;
        users.insert(user.id, user.clone());
    }

    pub async fn get(&self, id: UserId) -> Option<User> {
        let users = self.users.read().await;
        users.get(&id).cloned()
    }

    /// Attach a fetched avatar blob to the user's small profile photo.
    pub async fn populate_photo(&self, id: UserId, cache_key: &str, blob: &Bytes) -> bool {
        let mut users = self.users.write().await;
        let Some(photo) = users.get_mut(&id).and_then(|user| user.profile_photo.as_mut()) else {
            return false;
        };
        let file = if photo.small.cache_key == cache_key {
            &mut photo.small
        } else if photo.big.cache_key == cache_key {
            &mut photo.big
        } else {
            return false;
        };
        if file.is_loaded() {
            return false;
        }
        file.payload = Some(blob.clone());
        true
    }
}

/// Registry of conversation records, seeded by the embedding shell.
#[derive(Clone, Debug, Default)]
pub struct ChatDirectory {
    chats: Arc<RwLock<HashMap<ChatId, Chat>>>,
}

impl ChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, chat: &Chat) {
        let mut chats = self.chats.write().await;
        chats.insert(chat.id, chat.clone());
    }

    pub async fn get(&self, id: ChatId) -> Option<Chat> {
        let chats = self.chats.read().await;
        chats.get(&id).cloned()
    }

    /// Attach a fetched conversation photo blob.
    pub async fn populate_photo(&self, id: ChatId, cache_key: &str, blob: &Bytes) -> bool {
        let mut chats = self.chats.write().await;
        let Some(photo) = chats.get_mut(&id).and_then(|chat| chat.photo.as_mut()) else {
            return false;
        };
        let file = if photo.small.cache_key == cache_key {
            &mut photo.small
        } else if photo.big.cache_key == cache_key {
            &mut photo.big
        } else {
            return false;
        };
        if file.is_loaded() {
            return false;
        }
        file.payload = Some(blob.clone());
        true
    }
}
