//! Session-guarded history pagination.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use colloquy_api::{ChannelError, ChatChannel, ChatId, HistorySlice, MessageId};

use crate::session::SessionToken;

/// Why a history request was issued; decides how its page merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    /// First page after a conversation switch; replaces the sequence.
    Initial,
    /// Older page requested from the top edge; prepends.
    Older,
}

/// A completed history request, delivered back to the pane loop.
#[derive(Debug)]
pub struct HistoryOutcome {
    pub token: SessionToken,
    pub chat_id: ChatId,
    pub origin: LoadOrigin,
    pub result: Result<HistorySlice, ChannelError>,
}

/// Issues history requests and owns the cursor, reentrancy and backfill
/// rules. Requests run on their own tasks; outcomes come back through the
/// pane loop so the staleness guard sees current state when they land.
pub struct Paginator {
    channel: Arc<dyn ChatChannel>,
    outcome_tx: mpsc::Sender<HistoryOutcome>,
    slice_limit: u32,
    backfill_limit: u32,
    /// At most one older-page request outstanding at a time.
    loading: bool,
    /// Remaining backfill rounds for the current conversation.
    backfill_budget: u32,
}

impl Paginator {
    pub fn new(
        channel: Arc<dyn ChatChannel>,
        outcome_tx: mpsc::Sender<HistoryOutcome>,
        slice_limit: u32,
        backfill_limit: u32,
    ) -> Self {
        Self {
            channel,
            outcome_tx,
            slice_limit,
            backfill_limit,
            loading: false,
            backfill_budget: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Issue a history request. Older-page requests are reentrant-guarded:
    /// while one is outstanding the call is dropped and `false` returned.
    /// Initial requests never take the flag; they are serialized by the
    /// session token instead.
    pub fn request(
        &mut self,
        origin: LoadOrigin,
        chat_id: ChatId,
        from_message_id: MessageId,
        token: SessionToken,
    ) -> bool {
        if origin == LoadOrigin::Older {
            if self.loading {
                debug!(
                    target: "pane.history",
                    chat_id = %chat_id,
                    "older-page request dropped, one already in flight"
                );
                return false;
            }
            self.loading = true;
        }
        let channel = self.channel.clone();
        let outcome_tx = self.outcome_tx.clone();
        let limit = self.slice_limit;
        tokio::spawn(async move {
            let result = channel
                .get_chat_history(chat_id, from_message_id, 0, limit)
                .await;
            let _ = outcome_tx
                .send(HistoryOutcome {
                    token,
                    chat_id,
                    origin,
                    result,
                })
                .await;
        });
        true
    }

    /// Clear the in-flight flag. Runs for every older-page arrival, stale or
    /// not, so an abandoned response cannot wedge pagination.
    pub fn finish_older(&mut self) {
        self.loading = false;
    }

    /// Arm the backfill loop after an initial page was applied.
    pub fn arm_backfill(&mut self) {
        self.backfill_budget = self.backfill_limit;
    }

    pub fn abort_backfill(&mut self) {
        self.backfill_budget = 0;
    }

    /// Decide whether backfill should request another page after one of
    /// `page_len` messages was applied. A full or empty page ends the loop;
    /// otherwise one round of budget is consumed per request until the
    /// ceiling is reached.
    pub fn should_backfill(&mut self, page_len: usize) -> bool {
        if self.backfill_budget == 0 {
            return false;
        }
        if page_len == 0 || page_len as u32 >= self.slice_limit {
            self.backfill_budget = 0;
            return false;
        }
        self.backfill_budget -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{text_message, ScriptedChannel};

    fn paginator(channel: &ScriptedChannel) -> (Paginator, mpsc::Receiver<HistoryOutcome>) {
        let (tx, rx) = mpsc::channel(8);
        (Paginator::new(Arc::new(channel.clone()), tx, 20, 5), rx)
    }

    #[tokio::test]
    async fn older_requests_are_reentrant_guarded() {
        let channel = ScriptedChannel::new();
        channel.push_page(vec![text_message(5, 1, "old")]).await;
        channel.push_page(vec![]).await;
        let (mut paginator, mut rx) = paginator(&channel);

        let token = SessionToken::default();
        assert!(paginator.request(LoadOrigin::Older, ChatId(1), MessageId(10), token));
        assert!(!paginator.request(LoadOrigin::Older, ChatId(1), MessageId(10), token));

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.origin, LoadOrigin::Older);
        paginator.finish_older();
        assert!(paginator.request(LoadOrigin::Older, ChatId(1), MessageId(5), token));
    }

    #[tokio::test]
    async fn initial_requests_ignore_the_busy_flag() {
        let channel = ScriptedChannel::new();
        channel.push_page(vec![]).await;
        channel.push_page(vec![]).await;
        let (mut paginator, mut rx) = paginator(&channel);

        let token = SessionToken::default();
        assert!(paginator.request(LoadOrigin::Older, ChatId(1), MessageId(0), token));
        assert!(paginator.request(LoadOrigin::Initial, ChatId(2), MessageId(0), token));

        let mut origins = vec![
            rx.recv().await.unwrap().origin,
            rx.recv().await.unwrap().origin,
        ];
        origins.sort_by_key(|origin| *origin == LoadOrigin::Older);
        assert_eq!(origins, vec![LoadOrigin::Initial, LoadOrigin::Older]);
    }

    #[test]
    fn backfill_budget_is_bounded() {
        let (tx, _rx) = mpsc::channel(1);
        let channel: Arc<dyn ChatChannel> = Arc::new(ScriptedChannel::new());
        let mut paginator = Paginator::new(channel, tx, 20, 5);

        paginator.arm_backfill();
        // Short non-empty pages keep the loop going, five rounds at most.
        let mut rounds = 0;
        while paginator.should_backfill(7) {
            rounds += 1;
            assert!(rounds <= 5);
        }
        assert_eq!(rounds, 5);
    }

    #[test]
    fn full_or_empty_pages_end_backfill() {
        let (tx, _rx) = mpsc::channel(1);
        let channel: Arc<dyn ChatChannel> = Arc::new(ScriptedChannel::new());
        let mut paginator = Paginator::new(channel, tx, 20, 5);

        paginator.arm_backfill();
        assert!(!paginator.should_backfill(20));
        assert!(!paginator.should_backfill(7));

        paginator.arm_backfill();
        assert!(!paginator.should_backfill(0));
    }
}
