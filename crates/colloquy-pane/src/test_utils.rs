//! Test doubles and record constructors for pane tests.
//!
//! Public so embedding shells can drive the pane in their own tests without
//! a live backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, mpsc, oneshot};

use colloquy_api::{
    AssetFetcher, AssetOwner, BlobCache, ChannelError, Chat, ChatChannel, ChatId, ChatKind,
    ChatNotice, ChatPhoto, ChatUpdate, ChatUpdateSource, Contact, FetchError, FileId, FileRef,
    HistorySlice, Message, MessageContent, MessageId, Photo, PhotoSize, ProfilePhoto, Sticker,
    User, UserId,
};

use crate::history::History;
use crate::scroll::ScrollSnapshot;
use crate::viewport::ViewportSurface;

pub fn file_ref(id: i32, cache_key: &str) -> FileRef {
    FileRef {
        id: FileId(id),
        persistent_id: format!("remote-{id}"),
        cache_key: cache_key.to_string(),
        payload: None,
    }
}

/// File reference the server reports no asset for.
pub fn absent_file_ref(id: i32, cache_key: &str) -> FileRef {
    FileRef {
        id: FileId(id),
        persistent_id: String::new(),
        cache_key: cache_key.to_string(),
        payload: None,
    }
}

pub fn text_message(id: i64, chat_id: i64, text: &str) -> Message {
    Message {
        id: MessageId(id),
        chat_id: ChatId(chat_id),
        is_outgoing: false,
        date: 1_700_000_000 + id,
        sending_state: None,
        content: MessageContent::Text {
            text: text.to_string(),
        },
    }
}

pub fn outgoing_text_message(id: i64, chat_id: i64, text: &str) -> Message {
    Message {
        is_outgoing: true,
        ..text_message(id, chat_id, text)
    }
}

/// Photo message with a single rendition; the file id is the message id
/// truncated to `i32`.
pub fn photo_message(id: i64, chat_id: i64, cache_key: &str) -> Message {
    Message {
        content: MessageContent::Photo {
            photo: Photo {
                sizes: vec![PhotoSize {
                    kind: "m".to_string(),
                    width: 320,
                    height: 213,
                    file: file_ref(id as i32, cache_key),
                }],
            },
        },
        ..text_message(id, chat_id, "")
    }
}

pub fn sticker_message(id: i64, chat_id: i64, file_id: i32, cache_key: &str) -> Message {
    Message {
        content: MessageContent::Sticker {
            sticker: Sticker {
                width: 512,
                height: 512,
                emoji: "\u{1f44d}".to_string(),
                file: file_ref(file_id, cache_key),
            },
        },
        ..text_message(id, chat_id, "")
    }
}

pub fn contact_message(id: i64, chat_id: i64, user_id: i64) -> Message {
    Message {
        content: MessageContent::Contact {
            contact: Contact {
                user_id: UserId(user_id),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                phone_number: "+100".to_string(),
            },
        },
        ..text_message(id, chat_id, "")
    }
}

/// User whose small profile photo lives behind `cache_key`; the small file id
/// is the user id plus 1000.
pub fn user_with_photo(user_id: i64, cache_key: &str) -> User {
    User {
        id: UserId(user_id),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        profile_photo: Some(ProfilePhoto {
            small: file_ref(user_id as i32 + 1000, cache_key),
            big: file_ref(user_id as i32 + 2000, &format!("{cache_key}-big")),
        }),
    }
}

pub fn private_chat(chat_id: i64, user_id: i64, title: &str) -> Chat {
    Chat {
        id: ChatId(chat_id),
        title: title.to_string(),
        kind: ChatKind::Private {
            user_id: UserId(user_id),
        },
        photo: None,
    }
}

/// Private chat with a photo; the small file id is the chat id plus 3000.
pub fn chat_with_photo(chat_id: i64, user_id: i64, title: &str, cache_key: &str) -> Chat {
    Chat {
        photo: Some(ChatPhoto {
            small: file_ref(chat_id as i32 + 3000, cache_key),
            big: file_ref(chat_id as i32 + 4000, &format!("{cache_key}-big")),
        }),
        ..private_chat(chat_id, user_id, title)
    }
}

/// Recorded `get_chat_history` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    pub chat_id: ChatId,
    pub from_message_id: MessageId,
    pub limit: u32,
}

struct ScriptedPage {
    gate: Option<oneshot::Receiver<()>>,
    result: Result<HistorySlice, ChannelError>,
}

#[derive(Default)]
struct ChannelScript {
    chat_pages: HashMap<ChatId, VecDeque<ScriptedPage>>,
    default_pages: VecDeque<ScriptedPage>,
    requests: Vec<HistoryRequest>,
    notices: Vec<ChatNotice>,
}

/// Scripted backend channel: queued history pages, recorded notices. A page
/// carrying messages only answers requests for its own chat; pages without
/// messages answer any request. An exhausted queue answers with an empty
/// slice.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    inner: Arc<Mutex<ChannelScript>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page, newest message first, as the backend would return it.
    pub async fn push_page(&self, messages: Vec<Message>) {
        self.push(ScriptedPage {
            gate: None,
            result: Ok(HistorySlice { messages }),
        })
        .await;
    }

    /// Queue a page that is held until the returned sender fires (or drops).
    /// Lets a test interleave a conversation switch under an open request.
    pub async fn push_gated_page(&self, messages: Vec<Message>) -> oneshot::Sender<()> {
        let (release_tx, release_rx) = oneshot::channel();
        self.push(ScriptedPage {
            gate: Some(release_rx),
            result: Ok(HistorySlice { messages }),
        })
        .await;
        release_tx
    }

    pub async fn push_error(&self, error: ChannelError) {
        self.push(ScriptedPage {
            gate: None,
            result: Err(error),
        })
        .await;
    }

    async fn push(&self, page: ScriptedPage) {
        let chat_id = match &page.result {
            Ok(slice) => slice.messages.first().map(|message| message.chat_id),
            Err(_) => None,
        };
        let mut script = self.inner.lock().await;
        match chat_id {
            Some(chat_id) => script
                .chat_pages
                .entry(chat_id)
                .or_default()
                .push_back(page),
            None => script.default_pages.push_back(page),
        }
    }

    pub async fn requests(&self) -> Vec<HistoryRequest> {
        self.inner.lock().await.requests.clone()
    }

    pub async fn notices(&self) -> Vec<ChatNotice> {
        self.inner.lock().await.notices.clone()
    }
}

#[async_trait]
impl ChatChannel for ScriptedChannel {
    async fn get_chat_history(
        &self,
        chat_id: ChatId,
        from_message_id: MessageId,
        _offset: i32,
        limit: u32,
    ) -> Result<HistorySlice, ChannelError> {
        let page = {
            let mut script = self.inner.lock().await;
            script.requests.push(HistoryRequest {
                chat_id,
                from_message_id,
                limit,
            });
            let routed = script
                .chat_pages
                .get_mut(&chat_id)
                .and_then(VecDeque::pop_front);
            routed.or_else(|| script.default_pages.pop_front())
        };
        match page {
            Some(page) => {
                // Held outside the lock so other requests keep flowing.
                if let Some(gate) = page.gate {
                    let _ = gate.await;
                }
                page.result
            }
            None => Ok(HistorySlice::default()),
        }
    }

    async fn notify(&self, notice: ChatNotice) -> Result<(), ChannelError> {
        self.inner.lock().await.notices.push(notice);
        Ok(())
    }
}

/// Update source a test feeds by hand through [`ScriptedUpdates::sender`].
pub struct ScriptedUpdates {
    tx: mpsc::Sender<ChatUpdate>,
    rx: Mutex<Option<mpsc::Receiver<ChatUpdate>>>,
}

impl ScriptedUpdates {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<ChatUpdate> {
        self.tx.clone()
    }
}

impl Default for ScriptedUpdates {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatUpdateSource for ScriptedUpdates {
    async fn subscribe(&self) -> mpsc::Receiver<ChatUpdate> {
        // Only the first subscriber gets the live feed; later ones get a
        // receiver that never yields.
        self.rx
            .lock()
            .await
            .take()
            .unwrap_or_else(|| mpsc::channel(1).1)
    }
}

/// In-memory blob cache double.
#[derive(Clone, Default)]
pub struct MemoryBlobCache {
    blobs: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, cache_key: &str, blob: Bytes) {
        self.blobs
            .lock()
            .await
            .insert(cache_key.to_string(), blob);
    }

    pub async fn get(&self, cache_key: &str) -> Option<Bytes> {
        self.blobs.lock().await.get(cache_key).cloned()
    }

    pub async fn contains(&self, cache_key: &str) -> bool {
        self.blobs.lock().await.contains_key(cache_key)
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }
}

#[async_trait]
impl BlobCache for MemoryBlobCache {
    async fn has(&self, cache_key: &str) -> bool {
        self.contains(cache_key).await
    }

    async fn get(&self, cache_key: &str) -> Option<Bytes> {
        MemoryBlobCache::get(self, cache_key).await
    }

    async fn put(&self, cache_key: &str, blob: Bytes) {
        MemoryBlobCache::put(self, cache_key, blob).await;
    }
}

#[derive(Default)]
struct FetcherScript {
    blobs: HashMap<FileId, Bytes>,
    fetches: Vec<(FileId, AssetOwner)>,
    cancels: Vec<(FileId, AssetOwner)>,
}

/// Asset fetcher double with scripted blobs and recorded calls. Unscripted
/// file ids fail with a transport error.
#[derive(Clone, Default)]
pub struct RecordingFetcher {
    inner: Arc<Mutex<FetcherScript>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script_blob(&self, file_id: i32, blob: Bytes) {
        self.inner.lock().await.blobs.insert(FileId(file_id), blob);
    }

    pub async fn fetch_count(&self) -> usize {
        self.inner.lock().await.fetches.len()
    }

    pub async fn fetches(&self) -> Vec<(FileId, AssetOwner)> {
        self.inner.lock().await.fetches.clone()
    }

    pub async fn cancels(&self) -> Vec<(FileId, AssetOwner)> {
        self.inner.lock().await.cancels.clone()
    }
}

#[async_trait]
impl AssetFetcher for RecordingFetcher {
    async fn fetch(
        &self,
        file_id: FileId,
        _priority: u8,
        owner: AssetOwner,
    ) -> Result<Bytes, FetchError> {
        let mut script = self.inner.lock().await;
        script.fetches.push((file_id, owner));
        script
            .blobs
            .get(&file_id)
            .cloned()
            .ok_or_else(|| FetchError::Transport(format!("no scripted blob for file {file_id}")))
    }

    async fn cancel(&self, file_id: FileId, owner: AssetOwner) {
        self.inner.lock().await.cancels.push((file_id, owner));
    }
}

#[derive(Debug, Default)]
struct SurfaceState {
    offset: usize,
    viewport_height: usize,
    row_height: usize,
    item_count: usize,
    content_height: usize,
    scroll_writes: Vec<usize>,
    commits: u64,
}

/// Fixed-row-height rendering surface double. Clones share state, so a test
/// keeps one handle while the pane owns the boxed copy.
#[derive(Debug, Clone)]
pub struct FakeSurface {
    state: Arc<StdMutex<SurfaceState>>,
}

impl FakeSurface {
    pub const ROW_HEIGHT: usize = 10;

    pub fn new(viewport_height: usize) -> Self {
        Self::with_row_height(viewport_height, Self::ROW_HEIGHT)
    }

    pub fn with_row_height(viewport_height: usize, row_height: usize) -> Self {
        Self {
            state: Arc::new(StdMutex::new(SurfaceState {
                viewport_height,
                row_height,
                ..SurfaceState::default()
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn offset(&self) -> usize {
        self.lock().offset
    }

    pub fn content_height(&self) -> usize {
        self.lock().content_height
    }

    pub fn commits(&self) -> u64 {
        self.lock().commits
    }

    pub fn scroll_writes(&self) -> Vec<usize> {
        self.lock().scroll_writes.clone()
    }

    /// Simulate a user scroll. The pane learns about it separately, the way
    /// a shell forwards its scroll events.
    pub fn set_offset(&self, offset: usize) {
        self.lock().offset = offset;
    }

    pub fn set_viewport_height(&self, height: usize) {
        self.lock().viewport_height = height;
    }

    /// Pin geometry directly, for tests that bypass `commit`.
    pub fn force_geometry(&self, offset: usize, content_height: usize) {
        let mut state = self.lock();
        state.offset = offset;
        state.content_height = content_height;
        state.item_count = if state.row_height == 0 {
            0
        } else {
            content_height / state.row_height
        };
    }
}

impl ViewportSurface for FakeSurface {
    fn snapshot(&self) -> ScrollSnapshot {
        let state = self.lock();
        ScrollSnapshot {
            offset: state.offset,
            content_height: state.content_height,
            viewport_height: state.viewport_height,
        }
    }

    fn commit(&mut self, history: &History) {
        let mut state = self.lock();
        state.item_count = history.len();
        state.content_height = state.item_count * state.row_height;
        state.commits += 1;
        // A real surface clamps the offset when content shrinks under it.
        let max = state.content_height.saturating_sub(state.viewport_height);
        if state.offset > max {
            state.offset = max;
        }
    }

    fn scroll_to(&mut self, offset: usize) {
        let mut state = self.lock();
        let max = state.content_height.saturating_sub(state.viewport_height);
        state.offset = offset.min(max);
        let clamped = state.offset;
        state.scroll_writes.push(clamped);
    }

    fn visible_range(&self) -> Option<(usize, usize)> {
        let state = self.lock();
        if state.item_count == 0 || state.row_height == 0 || state.viewport_height == 0 {
            return None;
        }
        let first = state.offset / state.row_height;
        if first >= state.item_count {
            return None;
        }
        let last_unit = state.offset + state.viewport_height - 1;
        let last = (last_unit / state.row_height).min(state.item_count - 1);
        Some((first, last))
    }
}
