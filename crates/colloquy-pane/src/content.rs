//! Lazy loading of the binary assets referenced by messages.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use colloquy_api::{
    AssetFetcher, AssetOwner, BlobCache, Chat, ChatId, FileRef, Message, MessageContent,
    MessageId, User, UserId,
};

/// Where a fetched payload lands and which notification it raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetTarget {
    /// A file reference inside the message's own content.
    MessageContent { message_id: MessageId },
    /// The referenced user's small profile photo.
    UserPhoto { user_id: UserId },
    /// The conversation's own small photo.
    ChatPhoto { chat_id: ChatId },
}

/// A message's binary asset resolved to its stable address.
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub file: FileRef,
    pub target: AssetTarget,
    pub owner: AssetOwner,
    /// Only photo and sticker downloads are cancelled when they leave view.
    pub cancellable: bool,
}

/// A payload ready to be applied to pane state, delivered on the pane loop.
#[derive(Debug, Clone)]
pub struct AssetLoaded {
    pub target: AssetTarget,
    pub cache_key: String,
    pub blob: Bytes,
}

/// Resolve the zero-or-one binary asset behind a message.
///
/// `contact_user` is the directory record behind a contact card; without it,
/// or without a profile photo on it, contact resolution is skipped until the
/// record arrives through its own channel.
pub fn resolve_asset(
    message: &Message,
    contact_user: Option<&User>,
    photo_target_size: u32,
) -> Option<ResolvedAsset> {
    match &message.content {
        MessageContent::Photo { photo } => {
            let size = photo.best_fit(photo_target_size)?;
            Some(ResolvedAsset {
                file: size.file.clone(),
                target: AssetTarget::MessageContent {
                    message_id: message.id,
                },
                owner: AssetOwner::Message(message.id),
                cancellable: true,
            })
        }
        MessageContent::Sticker { sticker } => Some(ResolvedAsset {
            file: sticker.file.clone(),
            target: AssetTarget::MessageContent {
                message_id: message.id,
            },
            owner: AssetOwner::Message(message.id),
            cancellable: true,
        }),
        MessageContent::Contact { contact } => {
            if contact.user_id.0 <= 0 {
                return None;
            }
            let user = contact_user?;
            let photo = user.profile_photo.as_ref()?;
            Some(ResolvedAsset {
                file: photo.small.clone(),
                target: AssetTarget::UserPhoto { user_id: user.id },
                owner: AssetOwner::User(user.id),
                cancellable: false,
            })
        }
        MessageContent::Document { document } => {
            let thumbnail = document.thumbnail.as_ref()?;
            Some(ResolvedAsset {
                file: thumbnail.file.clone(),
                target: AssetTarget::MessageContent {
                    message_id: message.id,
                },
                owner: AssetOwner::Message(message.id),
                cancellable: false,
            })
        }
        MessageContent::Text { .. } => None,
    }
}

/// Resolve a conversation's own small photo.
pub fn resolve_chat_photo(chat: &Chat) -> Option<ResolvedAsset> {
    let photo = chat.photo.as_ref()?;
    Some(ResolvedAsset {
        file: photo.small.clone(),
        target: AssetTarget::ChatPhoto { chat_id: chat.id },
        owner: AssetOwner::Chat(chat.id),
        cancellable: false,
    })
}

/// Cache-first loader for resolved assets.
///
/// Each load runs on its own task: check the cache, on miss optionally fetch
/// remotely, write the blob back to the cache and hand the completion to the
/// pane loop. Idempotence is enforced at resolution time through the payload
/// gate; two loads racing for the same key may both fetch, which is
/// acceptable because the cache write is last-write-wins and payload
/// population is first-write-wins.
#[derive(Clone)]
pub struct ContentLoader {
    cache: Arc<dyn BlobCache>,
    fetcher: Arc<dyn AssetFetcher>,
    completion_tx: mpsc::Sender<AssetLoaded>,
    fetch_priority: u8,
}

impl ContentLoader {
    pub fn new(
        cache: Arc<dyn BlobCache>,
        fetcher: Arc<dyn AssetFetcher>,
        completion_tx: mpsc::Sender<AssetLoaded>,
        fetch_priority: u8,
    ) -> Self {
        Self {
            cache,
            fetcher,
            completion_tx,
            fetch_priority,
        }
    }

    /// Begin loading one resolved asset. Returns without spawning when the
    /// server holds no asset or the payload is already populated.
    pub fn spawn_load(&self, asset: ResolvedAsset, allow_remote: bool) {
        if !asset.file.is_present() || asset.file.is_loaded() {
            return;
        }
        let cache = self.cache.clone();
        let fetcher = self.fetcher.clone();
        let completion_tx = self.completion_tx.clone();
        let priority = self.fetch_priority;
        tokio::spawn(async move {
            let ResolvedAsset {
                file, target, owner, ..
            } = asset;
            if let Some(blob) = cache.get(&file.cache_key).await {
                let _ = completion_tx
                    .send(AssetLoaded {
                        target,
                        cache_key: file.cache_key,
                        blob,
                    })
                    .await;
                return;
            }
            if !allow_remote {
                return;
            }
            match fetcher.fetch(file.id, priority, owner).await {
                Ok(blob) => {
                    cache.put(&file.cache_key, blob.clone()).await;
                    let _ = completion_tx
                        .send(AssetLoaded {
                            target,
                            cache_key: file.cache_key,
                            blob,
                        })
                        .await;
                }
                Err(error) => {
                    debug!(
                        target: "pane.content",
                        file_id = %file.id,
                        owner = %owner,
                        "asset fetch failed: {error}"
                    );
                }
            }
        });
    }

    /// Ask the fetcher to stop a download whose asset left the viewport.
    /// Best effort: the result is ignored and the download may finish anyway.
    pub fn spawn_cancel(&self, asset: &ResolvedAsset) {
        if !asset.cancellable || !asset.file.is_present() || asset.file.is_loaded() {
            return;
        }
        let fetcher = self.fetcher.clone();
        let file_id = asset.file.id;
        let owner = asset.owner;
        tokio::spawn(async move {
            fetcher.cancel(file_id, owner).await;
        });
    }
}
