//! Trait seams onto the local blob cache and the remote asset fetcher.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use crate::types::{ChatId, FileId, MessageId, UserId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The transfer failed or timed out.
    #[error("fetch transport failure: {0}")]
    Transport(String),
    /// The transfer was cancelled before completion.
    #[error("fetch cancelled")]
    Cancelled,
}

/// The record an asset is being fetched on behalf of. Used for cancellation
/// bookkeeping and logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetOwner {
    Message(MessageId),
    User(UserId),
    Chat(ChatId),
}

impl fmt::Display for AssetOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetOwner::Message(id) => write!(f, "message {id}"),
            AssetOwner::User(id) => write!(f, "user {id}"),
            AssetOwner::Chat(id) => write!(f, "chat {id}"),
        }
    }
}

/// Opaque key-value blob store shared across conversations. Entries outlive
/// any single conversation's history.
#[async_trait]
pub trait BlobCache: Send + Sync {
    async fn has(&self, cache_key: &str) -> bool;
    async fn get(&self, cache_key: &str) -> Option<Bytes>;
    async fn put(&self, cache_key: &str, blob: Bytes);
}

/// Remote download side for binary assets.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download the asset behind `file_id`. Higher `priority` values are
    /// served sooner by backends that support it.
    async fn fetch(
        &self,
        file_id: FileId,
        priority: u8,
        owner: AssetOwner,
    ) -> Result<Bytes, FetchError>;

    /// Ask the backend to stop an in-flight download. Best effort: the
    /// download may complete anyway, and callers must not wait for it.
    async fn cancel(&self, file_id: FileId, owner: AssetOwner);
}
