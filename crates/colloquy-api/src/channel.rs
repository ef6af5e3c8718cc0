//! Trait seams onto the remote message-store channel.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::notice::ChatNotice;
use crate::types::{ChatId, HistorySlice, MessageId};
use crate::update::ChatUpdate;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The backend rejected or timed out the request.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The channel is gone; no further requests will succeed.
    #[error("channel closed")]
    Closed,
}

/// Abstraction over the request/response side of the backend connection.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Fetch one page of history. `from_message_id` of zero means "most
    /// recent"; otherwise the page starts strictly before that id. Messages
    /// come back newest first.
    async fn get_chat_history(
        &self,
        chat_id: ChatId,
        from_message_id: MessageId,
        offset: i32,
        limit: u32,
    ) -> Result<HistorySlice, ChannelError>;

    /// Deliver a one-way notice. Implementations should not block on the
    /// backend acknowledging it.
    async fn notify(&self, notice: ChatNotice) -> Result<(), ChannelError>;
}

/// Source of push updates produced by the backend.
///
/// Implementations typically wrap an `mpsc::Receiver<ChatUpdate>` or forward
/// updates from an external transport.
#[async_trait]
pub trait ChatUpdateSource: Send + Sync {
    /// Obtain a receiver yielding the update stream. The pane subscribes
    /// once at spawn time.
    async fn subscribe(&self) -> mpsc::Receiver<ChatUpdate>;
}
