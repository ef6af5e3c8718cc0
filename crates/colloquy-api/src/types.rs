//! Core records shared between the pane engine and its collaborators.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a message within a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a user account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for a remote binary asset, used for fetch and cancel calls.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct FileId(pub i32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a remote binary asset plus its locally cached payload.
///
/// The wire form never carries the payload; it is populated in place once the
/// blob becomes available locally. Population is one-way: empty to populated,
/// never invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: FileId,
    /// Server-side persistent id. Empty means the server holds no asset.
    pub persistent_id: String,
    /// Key into the local blob cache.
    pub cache_key: String,
    #[serde(skip)]
    pub payload: Option<Bytes>,
}

impl FileRef {
    pub fn is_present(&self) -> bool {
        !self.persistent_id.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.payload.is_some()
    }
}

/// One rendition of a photo at a particular resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
    /// Server size class ("s", "m", "x", ...).
    pub kind: String,
    pub width: u32,
    pub height: u32,
    pub file: FileRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub sizes: Vec<PhotoSize>,
}

impl Photo {
    /// Picks the size whose leading dimension is closest to `target`.
    ///
    /// The first entry's orientation decides which dimension leads: width for
    /// landscape, height for portrait. Ties go to the earlier entry.
    pub fn best_fit(&self, target: u32) -> Option<&PhotoSize> {
        let first = self.sizes.first()?;
        let use_width = first.width >= first.height;
        self.sizes.iter().min_by_key(|size| {
            let leading = if use_width { size.width } else { size.height };
            leading.abs_diff(target)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    pub width: u32,
    pub height: u32,
    pub emoji: String,
    pub file: FileRef,
}

/// Shared contact card. The avatar is not carried here; it lives on the
/// referenced user's profile photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub file: FileRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub file_name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    pub file: FileRef,
}

/// Message body variants the pane knows how to source binary content for.
/// Everything else arrives as `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Photo { photo: Photo },
    Sticker { sticker: Sticker },
    Contact { contact: Contact },
    Document { document: Document },
    Text { text: String },
}

impl MessageContent {
    /// Finds the asset reference carrying `cache_key`, if any.
    pub fn file_ref_by_key(&self, cache_key: &str) -> Option<&FileRef> {
        match self {
            MessageContent::Photo { photo } => photo
                .sizes
                .iter()
                .map(|size| &size.file)
                .find(|file| file.cache_key == cache_key),
            MessageContent::Sticker { sticker } => {
                (sticker.file.cache_key == cache_key).then_some(&sticker.file)
            }
            MessageContent::Document { document } => document
                .thumbnail
                .iter()
                .map(|thumb| &thumb.file)
                .chain(std::iter::once(&document.file))
                .find(|file| file.cache_key == cache_key),
            MessageContent::Contact { .. } | MessageContent::Text { .. } => None,
        }
    }

    pub fn file_ref_by_key_mut(&mut self, cache_key: &str) -> Option<&mut FileRef> {
        match self {
            MessageContent::Photo { photo } => photo
                .sizes
                .iter_mut()
                .map(|size| &mut size.file)
                .find(|file| file.cache_key == cache_key),
            MessageContent::Sticker { sticker } => {
                (sticker.file.cache_key == cache_key).then_some(&mut sticker.file)
            }
            MessageContent::Document { document } => document
                .thumbnail
                .as_mut()
                .map(|thumb| &mut thumb.file)
                .into_iter()
                .chain(std::iter::once(&mut document.file))
                .find(|file| file.cache_key == cache_key),
            MessageContent::Contact { .. } | MessageContent::Text { .. } => None,
        }
    }
}

/// Delivery progress for an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendingState {
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub is_outgoing: bool,
    /// Unix timestamp of the send time.
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sending_state: Option<SendingState>,
    pub content: MessageContent,
}

/// Conversation subject variants, used to pick the matching full-info refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatKind {
    Private { user_id: UserId },
    Secret { user_id: UserId },
    BasicGroup { basic_group_id: i32 },
    Supergroup { supergroup_id: i32, is_channel: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPhoto {
    pub small: FileRef,
    pub big: FileRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    pub kind: ChatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<ChatPhoto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePhoto {
    pub small: FileRef,
    pub big: FileRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<ProfilePhoto>,
}

/// One page of history as returned by the backend, newest message first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySlice {
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_ref(id: i32, key: &str) -> FileRef {
        FileRef {
            id: FileId(id),
            persistent_id: format!("persistent-{id}"),
            cache_key: key.to_string(),
            payload: None,
        }
    }

    fn photo_size(kind: &str, width: u32, height: u32, key: &str) -> PhotoSize {
        PhotoSize {
            kind: kind.to_string(),
            width,
            height,
            file: file_ref(1, key),
        }
    }

    #[test]
    fn best_fit_picks_closest_leading_dimension() {
        let photo = Photo {
            sizes: vec![
                photo_size("s", 90, 60, "k-s"),
                photo_size("m", 320, 213, "k-m"),
                photo_size("x", 800, 533, "k-x"),
            ],
        };
        let best = photo.best_fit(260);
        assert_eq!(best.map(|size| size.kind.as_str()), Some("m"));
    }

    #[test]
    fn best_fit_uses_height_for_portrait() {
        let photo = Photo {
            sizes: vec![
                photo_size("s", 60, 90, "k-s"),
                photo_size("m", 180, 270, "k-m"),
            ],
        };
        let best = photo.best_fit(260);
        assert_eq!(best.map(|size| size.kind.as_str()), Some("m"));
    }

    #[test]
    fn best_fit_on_empty_photo_is_none() {
        let photo = Photo { sizes: vec![] };
        assert!(photo.best_fit(260).is_none());
    }

    #[test]
    fn file_ref_lookup_walks_photo_sizes() {
        let mut content = MessageContent::Photo {
            photo: Photo {
                sizes: vec![photo_size("s", 90, 60, "small"), photo_size("x", 800, 533, "big")],
            },
        };
        assert!(content.file_ref_by_key("big").is_some());
        assert!(content.file_ref_by_key("absent").is_none());

        let file = content.file_ref_by_key_mut("big").unwrap();
        file.payload = Some(Bytes::from_static(b"blob"));
        assert!(content.file_ref_by_key("big").unwrap().is_loaded());
        assert!(!content.file_ref_by_key("small").unwrap().is_loaded());
    }

    #[test]
    fn file_ref_lookup_covers_document_thumbnail() {
        let content = MessageContent::Document {
            document: Document {
                file_name: "notes.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                thumbnail: Some(Thumbnail {
                    width: 90,
                    height: 60,
                    file: file_ref(7, "thumb"),
                }),
                file: file_ref(8, "full"),
            },
        };
        assert!(content.file_ref_by_key("thumb").is_some());
        assert!(content.file_ref_by_key("full").is_some());
    }

    #[test]
    fn payload_is_not_serialized() {
        let mut file = file_ref(3, "key");
        file.payload = Some(Bytes::from_static(b"blob"));
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("payload").is_none());

        let back: FileRef = serde_json::from_value(json).unwrap();
        assert!(!back.is_loaded());
        assert!(back.is_present());
    }
}
