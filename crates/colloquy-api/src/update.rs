//! Push updates flowing from the backend toward the pane.

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, Message, MessageId, User};

/// Server-initiated events the pane consumes. Updates for conversations other
/// than the active one are filtered by the pane, not the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatUpdate {
    /// A message was added to a conversation.
    NewMessage { message: Message },
    /// Messages were removed. `is_permanent` is false for local cache
    /// invalidations, which must not touch the displayed history.
    DeleteMessages {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
        is_permanent: bool,
    },
    /// A user record was created or changed.
    UserUpdated { user: User },
}
