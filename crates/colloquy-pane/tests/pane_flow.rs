//! End-to-end pane flows through a spawned actor: handle commands in,
//! events out, with scripted backend doubles underneath.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use colloquy_api::{ChatId, ChatNotice, ChatUpdate, Message, MessageId};
use colloquy_pane::test_utils::{
    FakeSurface, MemoryBlobCache, RecordingFetcher, ScriptedChannel, ScriptedUpdates,
    chat_with_photo, photo_message, private_chat, text_message,
};
use colloquy_pane::{
    ChatDirectory, HistoryChangeReason, MessageIndex, MessagePane, PaneConfig, PaneDeps,
    PaneEvent, PaneEventSubscription, PaneHandle, PaneState, UserDirectory,
};

const WAIT: Duration = Duration::from_secs(30);

struct Harness {
    handle: PaneHandle,
    join: JoinHandle<()>,
    channel: ScriptedChannel,
    update_tx: mpsc::Sender<ChatUpdate>,
    surface: FakeSurface,
    cache: MemoryBlobCache,
    fetcher: RecordingFetcher,
    chats: ChatDirectory,
}

async fn spawn_pane() -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .try_init();

    let channel = ScriptedChannel::new();
    let updates = ScriptedUpdates::new();
    let update_tx = updates.sender();
    let surface = FakeSurface::new(200);
    let cache = MemoryBlobCache::new();
    let fetcher = RecordingFetcher::new();
    let chats = ChatDirectory::default();
    let deps = PaneDeps {
        channel: Arc::new(channel.clone()),
        updates: Arc::new(updates),
        cache: Arc::new(cache.clone()),
        fetcher: Arc::new(fetcher.clone()),
        chats: chats.clone(),
        users: UserDirectory::default(),
        messages: MessageIndex::default(),
        surface: Box::new(surface.clone()),
        config: PaneConfig::default(),
    };
    let (handle, join) = MessagePane::spawn(deps).await;
    Harness {
        handle,
        join,
        channel,
        update_tx,
        surface,
        cache,
        fetcher,
        chats,
    }
}

/// Newest-first page of `count` messages ending at id `newest`.
fn page_desc(newest: i64, count: i64, chat_id: i64) -> Vec<Message> {
    (0..count)
        .map(|step| text_message(newest - step, chat_id, "m"))
        .collect()
}

async fn next_history_change(
    events: &mut PaneEventSubscription,
) -> (Option<ChatId>, HistoryChangeReason, u64) {
    loop {
        let envelope = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream ended");
        if let PaneEvent::HistoryChanged {
            chat_id,
            reason,
            revision,
        } = envelope.event
        {
            return (chat_id, reason, revision);
        }
    }
}

#[tokio::test]
async fn initial_load_end_to_end() {
    let harness = spawn_pane().await;
    harness.chats.upsert(&private_chat(1, 7, "Ada")).await;
    harness.channel.push_page(page_desc(130, 30, 1)).await;

    let mut events = harness.handle.subscribe().await.unwrap();
    harness.handle.select_chat(Some(ChatId(1))).await.unwrap();

    let (chat_id, reason, revision) = next_history_change(&mut events).await;
    assert_eq!(chat_id, Some(ChatId(1)));
    assert_eq!(reason, HistoryChangeReason::Replaced);
    assert_eq!(revision, 1);

    let status = harness.handle.status().await.unwrap();
    assert_eq!(status.state, PaneState::Ready);
    assert_eq!(status.chat_id, Some(ChatId(1)));
    assert_eq!(status.history_len, 30);

    // 30 rows of 10 against a 200 viewport.
    assert_eq!(harness.surface.offset(), 100);

    let notices = harness.channel.notices().await;
    assert!(matches!(notices[0], ChatNotice::OpenChat { chat_id } if chat_id == ChatId(1)));
    assert!(matches!(
        notices[1],
        ChatNotice::GetUserFullInfo { user_id } if user_id.0 == 7
    ));
    timeout(WAIT, async {
        loop {
            let viewed = harness.channel.notices().await.iter().any(|notice| {
                matches!(notice, ChatNotice::ViewMessages { message_ids, .. } if message_ids.len() == 30)
            });
            if viewed {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn switching_chats_discards_the_slower_response() {
    let harness = spawn_pane().await;
    harness.chats.upsert(&private_chat(1, 7, "Ada")).await;
    harness.chats.upsert(&private_chat(2, 8, "Grace")).await;
    let release_first = harness.channel.push_gated_page(page_desc(30, 3, 1)).await;
    let release_second = harness.channel.push_gated_page(page_desc(60, 4, 2)).await;

    let mut events = harness.handle.subscribe().await.unwrap();
    harness.handle.select_chat(Some(ChatId(1))).await.unwrap();
    harness.handle.select_chat(Some(ChatId(2))).await.unwrap();

    // The first conversation's page lands only after the switch.
    release_first.send(()).unwrap();
    release_second.send(()).unwrap();

    let (chat_id, reason, revision) = next_history_change(&mut events).await;
    assert_eq!(chat_id, Some(ChatId(2)));
    assert_eq!(reason, HistoryChangeReason::Replaced);
    // One mutation total; the stale page never touched the history.
    assert_eq!(revision, 1);

    let status = harness.handle.status().await.unwrap();
    assert_eq!(status.history_len, 4);
    assert_eq!(status.history_revision, 1);
}

#[tokio::test]
async fn live_updates_flow_through_the_loop() {
    let harness = spawn_pane().await;
    harness.chats.upsert(&private_chat(1, 7, "Ada")).await;
    harness.channel.push_page(page_desc(130, 30, 1)).await;
    let mut events = harness.handle.subscribe().await.unwrap();
    harness.handle.select_chat(Some(ChatId(1))).await.unwrap();
    let _ = next_history_change(&mut events).await;

    harness
        .update_tx
        .send(ChatUpdate::NewMessage {
            message: text_message(131, 1, "ping"),
        })
        .await
        .unwrap();
    let (_, reason, _) = next_history_change(&mut events).await;
    assert_eq!(reason, HistoryChangeReason::Appended);

    harness
        .update_tx
        .send(ChatUpdate::DeleteMessages {
            chat_id: ChatId(1),
            message_ids: vec![MessageId(131), MessageId(105)],
            is_permanent: true,
        })
        .await
        .unwrap();
    let (_, reason, _) = next_history_change(&mut events).await;
    assert_eq!(reason, HistoryChangeReason::Deleted);

    let status = harness.handle.status().await.unwrap();
    assert_eq!(status.history_len, 29);

    harness.handle.shutdown().await.unwrap();
    timeout(WAIT, harness.join).await.unwrap().unwrap();
}

#[tokio::test]
async fn selecting_none_empties_the_pane_and_closes_the_chat() {
    let harness = spawn_pane().await;
    harness.chats.upsert(&private_chat(1, 7, "Ada")).await;
    harness.channel.push_page(page_desc(130, 30, 1)).await;
    let mut events = harness.handle.subscribe().await.unwrap();
    harness.handle.select_chat(Some(ChatId(1))).await.unwrap();
    let _ = next_history_change(&mut events).await;

    harness.handle.select_chat(None).await.unwrap();
    let (chat_id, reason, _) = next_history_change(&mut events).await;
    assert_eq!(chat_id, None);
    assert_eq!(reason, HistoryChangeReason::Replaced);

    let status = harness.handle.status().await.unwrap();
    assert_eq!(status.state, PaneState::Idle);
    assert_eq!(status.chat_id, None);
    assert_eq!(status.history_len, 0);

    let notices = harness.channel.notices().await;
    assert!(
        notices
            .iter()
            .any(|notice| matches!(notice, ChatNotice::CloseChat { chat_id } if *chat_id == ChatId(1)))
    );
}

#[tokio::test(start_paused = true)]
async fn debounced_scroll_settle_reloads_visible_content() {
    let harness = spawn_pane().await;
    harness.chats.upsert(&private_chat(1, 7, "Ada")).await;
    // Forty photo rows. Nothing is scripted yet, so the eager loads that
    // follow the initial page all fail.
    let page: Vec<Message> = (0..40)
        .map(|step| photo_message(140 - step, 1, &format!("p{}", 140 - step)))
        .collect();
    harness.channel.push_page(page).await;

    let mut events = harness.handle.subscribe().await.unwrap();
    harness.handle.select_chat(Some(ChatId(1))).await.unwrap();
    let _ = next_history_change(&mut events).await;
    timeout(WAIT, async {
        while harness.fetcher.fetch_count().await < 40 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    // Now the blobs exist. Rows 10..=29 are visible at offset 100.
    for id in 101..=140_i64 {
        harness
            .fetcher
            .script_blob(id as i32, Bytes::from_static(b"jpeg"))
            .await;
    }
    // First scroll report is the echo of the bottom pin.
    harness.handle.scroll_changed().await.unwrap();
    harness.surface.set_offset(100);
    harness.handle.scroll_changed().await.unwrap();

    // The debounce window elapses on the paused clock, the recompute runs,
    // and the visible rows get their content.
    let mut updated = Vec::new();
    while updated.len() < 20 {
        let envelope = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for content updates")
            .expect("event stream ended");
        if let PaneEvent::MessageContentUpdated { message_id } = envelope.event {
            updated.push(message_id.0);
        }
    }
    updated.sort_unstable();
    let expected: Vec<i64> = (111..=130).collect();
    assert_eq!(updated, expected);
    assert!(harness.cache.contains("p111").await);
}

#[tokio::test]
async fn chat_photo_flows_through_the_cache_and_directory() {
    let harness = spawn_pane().await;
    harness
        .chats
        .upsert(&chat_with_photo(1, 7, "Ada", "chat-1-photo"))
        .await;
    // Small rendition of chat 1's photo carries file id 3001.
    harness
        .fetcher
        .script_blob(3001, Bytes::from_static(b"portrait"))
        .await;
    harness.channel.push_page(page_desc(30, 3, 1)).await;

    let mut events = harness.handle.subscribe().await.unwrap();
    harness.handle.select_chat(Some(ChatId(1))).await.unwrap();

    let updated = timeout(WAIT, async {
        loop {
            let envelope = events.recv().await.expect("event stream ended");
            if let PaneEvent::ChatPhotoUpdated { chat_id } = envelope.event {
                break chat_id;
            }
        }
    })
    .await
    .expect("timed out waiting for the chat photo");
    assert_eq!(updated, ChatId(1));

    // The blob landed in the cache and on the directory record's small
    // rendition before the event went out.
    assert!(harness.cache.contains("chat-1-photo").await);
    let photo = harness.chats.get(ChatId(1)).await.unwrap().photo.unwrap();
    assert!(photo.small.is_loaded());
    assert!(!photo.big.is_loaded());
}

#[tokio::test]
async fn event_envelopes_carry_increasing_seq() {
    let harness = spawn_pane().await;
    harness.chats.upsert(&private_chat(1, 7, "Ada")).await;
    harness.channel.push_page(page_desc(30, 3, 1)).await;
    let mut events = harness.handle.subscribe().await.unwrap();
    harness.handle.select_chat(Some(ChatId(1))).await.unwrap();

    let first = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    harness
        .update_tx
        .send(ChatUpdate::NewMessage {
            message: text_message(31, 1, "ping"),
        })
        .await
        .unwrap();
    let second = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert!(second.seq > first.seq);
}

#[tokio::test]
async fn dropping_every_handle_stops_the_actor() {
    let harness = spawn_pane().await;
    let Harness { handle, join, .. } = harness;
    drop(handle);
    timeout(WAIT, join).await.unwrap().unwrap();
}
