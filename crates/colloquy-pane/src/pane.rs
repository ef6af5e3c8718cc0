//! The message pane actor.
//!
//! Owns the selected conversation, its [`History`], and the scroll anchor,
//! and serializes every mutation through one task. Collaborators come in
//! through [`PaneDeps`]; shells talk to the pane through [`PaneHandle`] and
//! observe it through [`PaneEventSubscription`].

use std::sync::Arc;

use strum::Display;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use colloquy_api::{
    AssetFetcher, BlobCache, Chat, ChatChannel, ChatId, ChatKind, ChatNotice, ChatUpdate,
    ChatUpdateSource, Message, MessageContent, MessageId,
};

use crate::config::PaneConfig;
use crate::content::{AssetLoaded, AssetTarget, ContentLoader, resolve_asset, resolve_chat_photo};
use crate::error::{Error, Result};
use crate::events::{
    HistoryChangeReason, PaneEvent, PaneEventEnvelope, PaneEventSubscription, UnsubscribeSignal,
};
use crate::history::History;
use crate::pagination::{HistoryOutcome, LoadOrigin, Paginator};
use crate::registry::{ChatDirectory, MessageIndex, UserDirectory};
use crate::scroll::{ScrollAnchor, ScrollBehavior, append_behavior};
use crate::session::{SessionGuard, SessionToken};
use crate::viewport::{ViewportSurface, ViewportTracker, wait_until};

const CMD_CHANNEL_CAPACITY: usize = 32;
const COMPLETION_CHANNEL_CAPACITY: usize = 64;
const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Pane lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PaneState {
    /// No conversation is displayed.
    #[default]
    Idle,
    /// The initial page for the selected conversation is in flight.
    Loading,
    /// The initial page has been applied. Backfill may still be running.
    Ready,
}

/// Snapshot of pane observables, for shells and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneStatus {
    pub state: PaneState,
    pub chat_id: Option<ChatId>,
    pub history_len: usize,
    pub history_revision: u64,
    pub loading_older: bool,
}

/// Everything the pane needs at spawn time. All collaborators are injected;
/// the pane holds no globals.
pub struct PaneDeps {
    pub channel: Arc<dyn ChatChannel>,
    pub updates: Arc<dyn ChatUpdateSource>,
    pub cache: Arc<dyn BlobCache>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub chats: ChatDirectory,
    pub users: UserDirectory,
    pub messages: MessageIndex,
    pub surface: Box<dyn ViewportSurface>,
    pub config: PaneConfig,
}

enum PaneCmd {
    SelectChat {
        chat_id: Option<ChatId>,
        reply: oneshot::Sender<()>,
    },
    ScrollChanged {
        reply: oneshot::Sender<()>,
    },
    ViewportResized {
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        reply: oneshot::Sender<PaneEventSubscription>,
    },
    Status {
        reply: oneshot::Sender<PaneStatus>,
    },
    Shutdown,
}

/// Cheap cloneable handle to a running [`MessagePane`].
#[derive(Clone)]
pub struct PaneHandle {
    cmd_tx: mpsc::Sender<PaneCmd>,
}

impl PaneHandle {
    /// Switch the pane to `chat_id`, or to the empty state with `None`.
    /// Resolves once the switch has been applied; history for the new
    /// conversation arrives asynchronously.
    pub async fn select_chat(&self, chat_id: Option<ChatId>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(PaneCmd::SelectChat {
                chat_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::HandleClosed)?;
        reply_rx.await.map_err(|_| Error::HandleClosed)
    }

    /// Report that the surface's scroll offset changed.
    pub async fn scroll_changed(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(PaneCmd::ScrollChanged { reply: reply_tx })
            .await
            .map_err(|_| Error::HandleClosed)?;
        reply_rx.await.map_err(|_| Error::HandleClosed)
    }

    /// Report that the surface was resized.
    pub async fn viewport_resized(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(PaneCmd::ViewportResized { reply: reply_tx })
            .await
            .map_err(|_| Error::HandleClosed)?;
        reply_rx.await.map_err(|_| Error::HandleClosed)
    }

    pub async fn subscribe(&self) -> Result<PaneEventSubscription> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(PaneCmd::Subscribe { reply: reply_tx })
            .await
            .map_err(|_| Error::HandleClosed)?;
        reply_rx.await.map_err(|_| Error::HandleClosed)
    }

    pub async fn status(&self) -> Result<PaneStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(PaneCmd::Status { reply: reply_tx })
            .await
            .map_err(|_| Error::HandleClosed)?;
        reply_rx.await.map_err(|_| Error::HandleClosed)
    }

    /// Ask the pane to stop. Await the [`JoinHandle`] from
    /// [`MessagePane::spawn`] to observe completion.
    pub async fn shutdown(&self) -> Result<()> {
        self.cmd_tx
            .send(PaneCmd::Shutdown)
            .await
            .map_err(|_| Error::HandleClosed)
    }
}

pub struct MessagePane {
    state: PaneState,
    selected_chat: Option<ChatId>,
    session: SessionGuard,
    history: History,
    anchor: ScrollAnchor,
    paginator: Paginator,
    loader: ContentLoader,
    tracker: ViewportTracker,
    surface: Box<dyn ViewportSurface>,
    channel: Arc<dyn ChatChannel>,
    chats: ChatDirectory,
    users: UserDirectory,
    messages: MessageIndex,
    config: PaneConfig,
    event_broadcast: broadcast::Sender<PaneEventEnvelope>,
    event_seq: u64,
    subscriber_count: usize,
    unsubscribe_tx: mpsc::UnboundedSender<UnsubscribeSignal>,
    unsubscribe_rx: mpsc::UnboundedReceiver<UnsubscribeSignal>,
    outcome_rx: mpsc::Receiver<HistoryOutcome>,
    asset_rx: mpsc::Receiver<AssetLoaded>,
    /// Visible ids at the last recomputation, for leave-view cancellation.
    last_visible: Vec<MessageId>,
}

impl MessagePane {
    /// Spawn the pane actor. The returned [`JoinHandle`] resolves after
    /// [`PaneHandle::shutdown`] or once every handle is dropped.
    pub async fn spawn(deps: PaneDeps) -> (PaneHandle, JoinHandle<()>) {
        let update_rx = deps.updates.subscribe().await;
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let pane = Self::assemble(deps);
        let join = tokio::spawn(pane.run(cmd_rx, update_rx));
        (PaneHandle { cmd_tx }, join)
    }

    fn assemble(deps: PaneDeps) -> Self {
        let PaneDeps {
            channel,
            updates: _,
            cache,
            fetcher,
            chats,
            users,
            messages,
            surface,
            config,
        } = deps;
        let (event_broadcast, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let (unsubscribe_tx, unsubscribe_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);
        let (asset_tx, asset_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);
        let paginator = Paginator::new(
            channel.clone(),
            outcome_tx,
            config.slice_limit,
            config.backfill_limit,
        );
        let loader = ContentLoader::new(cache, fetcher, asset_tx, config.fetch_priority);
        let tracker = ViewportTracker::new(config.viewport_debounce());
        Self {
            state: PaneState::Idle,
            selected_chat: None,
            session: SessionGuard::default(),
            history: History::new(),
            anchor: ScrollAnchor::default(),
            paginator,
            loader,
            tracker,
            surface,
            channel,
            chats,
            users,
            messages,
            config,
            event_broadcast,
            event_seq: 0,
            subscriber_count: 0,
            unsubscribe_tx,
            unsubscribe_rx,
            outcome_rx,
            asset_rx,
            last_visible: Vec::new(),
        }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<PaneCmd>,
        mut update_rx: mpsc::Receiver<ChatUpdate>,
    ) {
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        PaneCmd::SelectChat { chat_id, reply } => {
                            self.handle_select_chat(chat_id).await;
                            let _ = reply.send(());
                        }
                        PaneCmd::ScrollChanged { reply } => {
                            self.handle_scroll();
                            let _ = reply.send(());
                        }
                        PaneCmd::ViewportResized { reply } => {
                            self.tracker.poke();
                            let _ = reply.send(());
                        }
                        PaneCmd::Subscribe { reply } => {
                            let _ = reply.send(self.create_subscription());
                        }
                        PaneCmd::Status { reply } => {
                            let _ = reply.send(self.status());
                        }
                        PaneCmd::Shutdown => break,
                    }
                }

                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_history_outcome(outcome).await;
                }

                Some(loaded) = self.asset_rx.recv() => {
                    self.handle_asset_loaded(loaded).await;
                }

                Some(update) = update_rx.recv() => {
                    self.handle_update(update).await;
                }

                Some(UnsubscribeSignal) = self.unsubscribe_rx.recv() => {
                    self.subscriber_disconnected();
                }

                () = wait_until(self.tracker.deadline()) => {
                    self.tracker.clear();
                    self.recompute_visible().await;
                }
            }
        }
        debug!(target: "pane", "Message pane stopped");
    }

    /// Switch conversations. Re-selecting the current one is a no-op.
    async fn handle_select_chat(&mut self, chat_id: Option<ChatId>) {
        if self.selected_chat == chat_id {
            return;
        }
        let previous = self.selected_chat.take();
        self.selected_chat = chat_id;
        let token = self.session.mint();
        self.paginator.abort_backfill();

        let chat = match chat_id {
            Some(id) => self.chats.get(id).await,
            None => None,
        };
        match chat {
            Some(chat) => {
                self.state = PaneState::Loading;
                debug!(target: "pane.history", chat_id = %chat.id, session = %token, state = %self.state, "Opening conversation");
                self.send_notice(ChatNotice::OpenChat { chat_id: chat.id })
                    .await;
                self.paginator
                    .request(LoadOrigin::Initial, chat.id, MessageId(0), token);
                self.request_full_info(&chat).await;
                if let Some(asset) = resolve_chat_photo(&chat) {
                    self.loader.spawn_load(asset, true);
                }
            }
            None => {
                // An id with no chat record behaves like clearing the pane.
                self.state = PaneState::Idle;
                self.apply_mutation(
                    HistoryChangeReason::Replaced,
                    ScrollBehavior::ScrollToBottom,
                    |history| history.replace(Vec::new()),
                );
            }
        }

        if let Some(previous) = previous {
            self.send_notice(ChatNotice::CloseChat { chat_id: previous })
                .await;
        }
    }

    async fn handle_history_outcome(&mut self, outcome: HistoryOutcome) {
        let HistoryOutcome {
            token,
            chat_id,
            origin,
            result,
        } = outcome;
        if origin == LoadOrigin::Older {
            // Cleared before any guard so a stale arrival cannot wedge
            // pagination for the conversation now on screen.
            self.paginator.finish_older();
        }
        if self.is_stale(token, chat_id) {
            debug!(target: "pane.history", chat_id = %chat_id, session = %token, "Dropping stale history response");
            self.paginator.abort_backfill();
            return;
        }
        let slice = match result {
            Ok(slice) => slice,
            Err(error) => {
                warn!(target: "pane.history", chat_id = %chat_id, error = %error, "History request failed");
                self.paginator.abort_backfill();
                return;
            }
        };
        self.state = PaneState::Ready;

        // Pages arrive newest first; the pane displays oldest first.
        let mut page = slice.messages;
        self.messages.upsert_page(&page).await;
        page.reverse();
        let page_len = page.len();
        let page_ids: Vec<MessageId> = page.iter().map(|message| message.id).collect();
        let batch = page.clone();

        match origin {
            LoadOrigin::Initial => {
                self.apply_mutation(
                    HistoryChangeReason::Replaced,
                    ScrollBehavior::ScrollToBottom,
                    move |history| history.replace(page),
                );
                self.load_batch(&batch, true).await;
                self.view_messages(chat_id, page_ids).await;
                self.paginator.arm_backfill();
            }
            LoadOrigin::Older => {
                let applied = self.apply_mutation(
                    HistoryChangeReason::Prepended,
                    ScrollBehavior::KeepPosition,
                    move |history| history.prepend(page),
                );
                if applied {
                    self.load_batch(&batch, true).await;
                    self.view_messages(chat_id, page_ids).await;
                }
            }
        }

        if self.paginator.should_backfill(page_len) {
            self.request_older();
        }
    }

    async fn handle_update(&mut self, update: ChatUpdate) {
        match update {
            ChatUpdate::NewMessage { message } => self.handle_new_message(message).await,
            ChatUpdate::DeleteMessages {
                chat_id,
                message_ids,
                is_permanent,
            } => {
                self.handle_delete_messages(chat_id, &message_ids, is_permanent)
                    .await;
            }
            ChatUpdate::UserUpdated { user } => {
                self.users.upsert(&user).await;
            }
        }
    }

    async fn handle_new_message(&mut self, message: Message) {
        if self.selected_chat != Some(message.chat_id) {
            return;
        }
        self.messages.upsert(&message).await;
        let behavior = append_behavior(
            self.surface.snapshot(),
            message.is_outgoing,
            self.config.bottom_tolerance,
        );
        let chat_id = message.chat_id;
        let message_id = message.id;
        let batch = vec![message.clone()];
        let appended = self.apply_mutation(HistoryChangeReason::Appended, behavior, move |history| {
            history.append(vec![message])
        });
        if appended {
            self.load_batch(&batch, true).await;
            self.view_messages(chat_id, vec![message_id]).await;
        }
    }

    async fn handle_delete_messages(
        &mut self,
        chat_id: ChatId,
        message_ids: &[MessageId],
        is_permanent: bool,
    ) {
        if !is_permanent {
            return;
        }
        if self.selected_chat != Some(chat_id) || self.history.is_empty() {
            return;
        }
        let ids = message_ids.to_vec();
        let deleted = self.apply_mutation(
            HistoryChangeReason::Deleted,
            ScrollBehavior::ScrollToBottom,
            move |history| history.delete_by_ids(&ids),
        );
        if deleted {
            self.messages.remove_ids(message_ids).await;
        }
    }

    fn handle_scroll(&mut self) {
        // A programmatic scroll echoes back through the shell once; swallow it.
        if self.anchor.take_suppressed() {
            return;
        }
        let snapshot = self.surface.snapshot();
        if snapshot.offset == 0 {
            self.request_older();
        } else {
            self.tracker.poke();
        }
    }

    async fn handle_asset_loaded(&mut self, loaded: AssetLoaded) {
        let AssetLoaded {
            target,
            cache_key,
            blob,
        } = loaded;
        match target {
            AssetTarget::MessageContent { message_id } => {
                let indexed = self.messages.populate_file(message_id, &cache_key, &blob).await;
                let displayed = self.history.populate_file(message_id, &cache_key, &blob);
                if displayed {
                    self.surface.commit(&self.history);
                }
                if indexed || displayed {
                    self.emit(PaneEvent::MessageContentUpdated { message_id });
                }
            }
            AssetTarget::UserPhoto { user_id } => {
                if self.users.populate_photo(user_id, &cache_key, &blob).await {
                    self.emit(PaneEvent::UserPhotoUpdated { user_id });
                }
            }
            AssetTarget::ChatPhoto { chat_id } => {
                if self.chats.populate_photo(chat_id, &cache_key, &blob).await {
                    self.emit(PaneEvent::ChatPhotoUpdated { chat_id });
                }
            }
        }
    }

    /// Debounce settled: resolve the visible span, re-issue content loading
    /// for it, and cancel downloads for items that left the view.
    async fn recompute_visible(&mut self) {
        let Some((first, last)) = self.surface.visible_range() else {
            self.last_visible.clear();
            return;
        };
        let mut visible: Vec<Message> = Vec::with_capacity(last.saturating_sub(first) + 1);
        for index in first..=last {
            if let Some(message) = self.history.get_index(index) {
                visible.push(message.clone());
            }
        }
        let visible_ids: Vec<MessageId> = visible.iter().map(|message| message.id).collect();

        for id in &self.last_visible {
            if visible_ids.contains(id) {
                continue;
            }
            let Some(message) = self.history.get(*id) else {
                continue;
            };
            if let Some(asset) = resolve_asset(message, None, self.config.photo_target_size) {
                self.loader.spawn_cancel(&asset);
            }
        }
        self.last_visible = visible_ids;
        self.load_batch(&visible, true).await;
    }

    fn request_older(&mut self) {
        let Some(chat_id) = self.selected_chat else {
            return;
        };
        // An empty sequence retries with the initial cursor; a failed first
        // load is recovered from here.
        let from = self.history.first_id().unwrap_or(MessageId(0));
        self.paginator
            .request(LoadOrigin::Older, chat_id, from, self.session.current());
    }

    /// One observable update: snapshot, mutate, re-layout, resolve the scroll
    /// adjustment, then notify subscribers. Returns false when the mutation
    /// changed nothing, in which case nothing else happens either.
    fn apply_mutation(
        &mut self,
        reason: HistoryChangeReason,
        behavior: ScrollBehavior,
        mutate: impl FnOnce(&mut History) -> bool,
    ) -> bool {
        let before = self.surface.snapshot();
        if !mutate(&mut self.history) {
            return false;
        }
        let revision = self.history.revision();
        self.surface.commit(&self.history);
        self.anchor.apply(self.surface.as_mut(), before, behavior);
        debug!(target: "pane", reason = %reason, revision, "History mutated");
        self.emit(PaneEvent::HistoryChanged {
            chat_id: self.selected_chat,
            reason,
            revision,
        });
        true
    }

    /// Issue content loading for a batch in display order. Resolution skips
    /// assets that are already populated, so repeat calls are cheap.
    async fn load_batch(&self, batch: &[Message], allow_remote: bool) {
        for message in batch {
            let contact_user = match &message.content {
                MessageContent::Contact { contact } => self.users.get(contact.user_id).await,
                _ => None,
            };
            if let Some(asset) =
                resolve_asset(message, contact_user.as_ref(), self.config.photo_target_size)
            {
                self.loader.spawn_load(asset, allow_remote);
            }
        }
    }

    async fn view_messages(&self, chat_id: ChatId, message_ids: Vec<MessageId>) {
        if message_ids.is_empty() {
            return;
        }
        self.send_notice(ChatNotice::ViewMessages {
            chat_id,
            message_ids,
        })
        .await;
    }

    async fn request_full_info(&self, chat: &Chat) {
        let notice = match chat.kind {
            ChatKind::Private { user_id } | ChatKind::Secret { user_id } => {
                ChatNotice::GetUserFullInfo { user_id }
            }
            ChatKind::BasicGroup { basic_group_id } => {
                ChatNotice::GetBasicGroupFullInfo { basic_group_id }
            }
            ChatKind::Supergroup { supergroup_id, .. } => {
                ChatNotice::GetSupergroupFullInfo { supergroup_id }
            }
        };
        self.send_notice(notice).await;
    }

    /// Best effort: a failed notice is logged and never aborts the flow
    /// that sent it.
    async fn send_notice(&self, notice: ChatNotice) {
        if let Err(error) = self.channel.notify(notice).await {
            debug!(target: "pane", error = %error, "Notice dropped");
        }
    }

    /// The single staleness rule: a completion is stale when its session
    /// token was superseded or its conversation is no longer selected.
    fn is_stale(&self, token: SessionToken, chat_id: ChatId) -> bool {
        self.session.is_stale(token) || self.selected_chat != Some(chat_id)
    }

    fn emit(&mut self, event: PaneEvent) {
        self.event_seq += 1;
        // Nobody listening is fine.
        let _ = self.event_broadcast.send(PaneEventEnvelope {
            seq: self.event_seq,
            event,
        });
    }

    fn create_subscription(&mut self) -> PaneEventSubscription {
        self.subscriber_count += 1;
        debug!(target: "pane.events", subscriber_count = self.subscriber_count, "Subscriber connected");
        PaneEventSubscription::new(self.event_broadcast.subscribe(), self.unsubscribe_tx.clone())
    }

    fn subscriber_disconnected(&mut self) {
        self.subscriber_count = self.subscriber_count.saturating_sub(1);
        debug!(target: "pane.events", subscriber_count = self.subscriber_count, "Subscriber disconnected");
    }

    fn status(&self) -> PaneStatus {
        PaneStatus {
            state: self.state,
            chat_id: self.selected_chat,
            history_len: self.history.len(),
            history_revision: self.history.revision(),
            loading_older: self.paginator.is_loading(),
        }
    }
}
