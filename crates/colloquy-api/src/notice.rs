//! Fire-and-forget notifications sent toward the backend.

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, MessageId, UserId};

/// One-way signals the pane sends over the channel. None of these carry a
/// response; delivery failures are logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatNotice {
    /// The conversation became the active one.
    OpenChat { chat_id: ChatId },
    /// The conversation stopped being the active one.
    CloseChat { chat_id: ChatId },
    /// The listed messages were displayed to the user.
    ViewMessages {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    },
    /// Refresh full metadata for a private or secret conversation's user.
    GetUserFullInfo { user_id: UserId },
    /// Refresh full metadata for a basic group.
    GetBasicGroupFullInfo { basic_group_id: i32 },
    /// Refresh full metadata for a supergroup or channel.
    GetSupergroupFullInfo { supergroup_id: i32 },
}
