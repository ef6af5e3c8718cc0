//! Typed notifications emitted by the pane for rendering shells.

use strum::Display;
use tokio::sync::{broadcast, mpsc};

use colloquy_api::{ChatId, MessageId, UserId};

/// Why the displayed sequence changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum HistoryChangeReason {
    Replaced,
    Prepended,
    Appended,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneEvent {
    /// The message sequence mutated and the paired scroll adjustment has been
    /// applied. `revision` matches `History::revision` after the mutation.
    HistoryChanged {
        chat_id: Option<ChatId>,
        reason: HistoryChangeReason,
        revision: u64,
    },
    /// A binary asset referenced by this message became available.
    MessageContentUpdated { message_id: MessageId },
    /// A user's profile photo became available.
    UserPhotoUpdated { user_id: UserId },
    /// The conversation's own photo became available.
    ChatPhotoUpdated { chat_id: ChatId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneEventEnvelope {
    pub seq: u64,
    pub event: PaneEvent,
}

pub(crate) struct UnsubscribeSignal;

/// Live subscription to pane events. Dropping it unregisters the subscriber.
pub struct PaneEventSubscription {
    pub rx: broadcast::Receiver<PaneEventEnvelope>,
    unsubscribe_tx: mpsc::UnboundedSender<UnsubscribeSignal>,
}

impl PaneEventSubscription {
    pub(crate) fn new(
        rx: broadcast::Receiver<PaneEventEnvelope>,
        unsubscribe_tx: mpsc::UnboundedSender<UnsubscribeSignal>,
    ) -> Self {
        Self { rx, unsubscribe_tx }
    }

    pub async fn recv(&mut self) -> Option<PaneEventEnvelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        lagged = n,
                        "Pane event subscriber lagged, some events were dropped"
                    );
                }
            }
        }
    }
}

impl Drop for PaneEventSubscription {
    fn drop(&mut self) {
        let _ = self.unsubscribe_tx.send(UnsubscribeSignal);
    }
}
