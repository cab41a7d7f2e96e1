//! Queue synchronizer behaviour against an in-memory server.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use banter_api::{BanterApi, MockBanterApi, OverlayPreferences};
use banter_core::ApiError;
use banter_core::ids::{ItemId, OwnerId};
use banter_core::messages::{DisplayableItem, InboundMessage, MessageKind};
use banter_dashboard::{QueueSnapshot, QueueSynchronizer};
use banter_settings::DashboardSettings;
use banter_socket::EventDispatcher;
use parking_lot::Mutex;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(300);

/// Server stand-in with adjustable latency and scripted responses.
#[derive(Default)]
struct FakeApi {
    latency: Duration,
    list_calls: AtomicUsize,
    scripted: Mutex<VecDeque<Result<Vec<DisplayableItem>, ApiError>>>,
    items: Mutex<Vec<DisplayableItem>>,
    played: Mutex<Vec<ItemId>>,
}

impl FakeApi {
    fn with_items(items: Vec<DisplayableItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BanterApi for FakeApi {
    async fn list_items(
        &self,
        _owner: &OwnerId,
        unplayed_only: bool,
    ) -> Result<Vec<DisplayableItem>, ApiError> {
        let _ = self.list_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        if let Some(scripted) = self.scripted.lock().pop_front() {
            return scripted;
        }
        let items = self.items.lock().clone();
        Ok(items
            .into_iter()
            .filter(|item| !unplayed_only || !item.is_played)
            .collect())
    }

    async fn mark_played(&self, item: &ItemId) -> Result<(), ApiError> {
        self.played.lock().push(item.clone());
        for stored in self.items.lock().iter_mut() {
            if &stored.id == item {
                stored.is_played = true;
            }
        }
        Ok(())
    }

    async fn overlay_preferences(&self, _owner: &OwnerId) -> Result<OverlayPreferences, ApiError> {
        Ok(OverlayPreferences::default())
    }
}

fn items(ids: &[&str]) -> Vec<DisplayableItem> {
    ids.iter().map(|id| DisplayableItem::new(*id, format!("text {id}"))).collect()
}

fn start(api: &Arc<FakeApi>, dispatcher: &EventDispatcher) -> QueueSynchronizer {
    let dyn_api: Arc<dyn BanterApi> = api.clone();
    QueueSynchronizer::spawn(
        OwnerId::from("o1"),
        dispatcher,
        dyn_api,
        &DashboardSettings::default(),
    )
}

async fn wait_for(sync: &QueueSynchronizer, f: impl FnMut(&QueueSnapshot) -> bool) -> QueueSnapshot {
    let mut rx = sync.watch();
    timeout(WAIT, rx.wait_for(f)).await.unwrap().unwrap().clone()
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn event(kind: MessageKind) -> InboundMessage {
    InboundMessage::with_item(kind, &DisplayableItem::new("n", "new"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_fetch_publishes_pending_count() {
    let mut list = items(&["a", "b", "c"]);
    list[1].is_played = true;
    let api = Arc::new(FakeApi::with_items(list));
    let dispatcher = EventDispatcher::new();
    let sync = start(&api, &dispatcher);

    let snapshot = wait_for(&sync, QueueSnapshot::is_loaded).await;
    let ids: Vec<&str> = snapshot.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["a", "c"]);
    assert_eq!(snapshot.pending_count, 2);
    assert_eq!(sync.pending_count(), 2);
    assert!(snapshot.fetched_at.is_some());
    sync.close().await;
}

#[tokio::test(start_paused = true)]
async fn every_queue_event_refetches() {
    let api = Arc::new(FakeApi::with_items(items(&["a"])));
    let dispatcher = EventDispatcher::new();
    let sync = start(&api, &dispatcher);
    let _ = wait_for(&sync, |s| s.fetch_seq == 1).await;

    let kinds = [
        MessageKind::NewItem,
        MessageKind::ItemPlayed,
        MessageKind::ItemReplayed,
        MessageKind::ItemUpdated,
        MessageKind::ItemDeleted,
    ];
    for (n, kind) in kinds.into_iter().enumerate() {
        dispatcher.dispatch(event(kind));
        let expected = n as u64 + 2;
        let _ = wait_for(&sync, |s| s.fetch_seq == expected).await;
    }
    assert_eq!(api.calls(), 6);
    sync.close().await;
}

#[tokio::test(start_paused = true)]
async fn unrelated_events_do_not_refetch() {
    let api = Arc::new(FakeApi::with_items(items(&["a"])));
    let dispatcher = EventDispatcher::new();
    let sync = start(&api, &dispatcher);
    let _ = wait_for(&sync, QueueSnapshot::is_loaded).await;

    dispatcher.dispatch(InboundMessage::bare(MessageKind::Unknown));
    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(api.calls(), 1);
    sync.close().await;
}

#[tokio::test(start_paused = true)]
async fn polling_refetches_without_events() {
    let api = Arc::new(FakeApi::with_items(items(&["a"])));
    let dispatcher = EventDispatcher::new();
    let sync = start(&api, &dispatcher);
    let _ = wait_for(&sync, QueueSnapshot::is_loaded).await;

    // A server-side change that no event announced.
    api.items.lock().push(DisplayableItem::new("b", "missed"));
    tokio::time::sleep(Duration::from_millis(29_000)).await;
    settle().await;
    assert_eq!(api.calls(), 1);

    let snapshot = wait_for(&sync, |s| s.pending_count == 2).await;
    assert_eq!(snapshot.fetch_seq, 2);
    sync.close().await;
}

#[tokio::test(start_paused = true)]
async fn failed_refetch_keeps_last_good_list() {
    let api = Arc::new(FakeApi::with_items(items(&["a", "b"])));
    let dispatcher = EventDispatcher::new();
    let sync = start(&api, &dispatcher);
    let _ = wait_for(&sync, QueueSnapshot::is_loaded).await;

    api.scripted.lock().push_back(Err(ApiError::Status {
        url: "http://server/api/owners/o1/items".into(),
        status: 503,
    }));
    sync.invalidate();
    let failed = wait_for(&sync, |s| s.last_error.is_some()).await;
    assert_eq!(failed.pending_count, 2);
    assert_eq!(failed.items.len(), 2);
    assert_eq!(failed.fetch_seq, 1);

    // Recovers on the next regular refetch.
    let recovered = wait_for(&sync, |s| s.last_error.is_none()).await;
    assert_eq!(recovered.pending_count, 2);
    assert!(recovered.fetch_seq > 2);
    sync.close().await;
}

#[tokio::test(start_paused = true)]
async fn bursts_coalesce_into_one_follow_up() {
    let api = Arc::new(FakeApi {
        latency: Duration::from_secs(1),
        ..FakeApi::with_items(items(&["a"]))
    });
    let dispatcher = EventDispatcher::new();
    let sync = start(&api, &dispatcher);
    settle().await;
    assert_eq!(api.calls(), 1);

    for _ in 0..5 {
        dispatcher.dispatch(event(MessageKind::NewItem));
    }
    let _ = wait_for(&sync, |s| s.fetch_seq == 2).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(api.calls(), 2);
    assert_eq!(sync.snapshot().fetches_started, 2);
    sync.close().await;
}

#[tokio::test(start_paused = true)]
async fn manual_play_marks_and_refetches() {
    let api = Arc::new(FakeApi::with_items(items(&["a", "b"])));
    let dispatcher = EventDispatcher::new();
    let sync = start(&api, &dispatcher);
    let _ = wait_for(&sync, |s| s.pending_count == 2).await;

    sync.play_item(&ItemId::from("a")).await.unwrap();
    assert_eq!(api.played.lock().as_slice(), [ItemId::from("a")]);

    let snapshot = wait_for(&sync, |s| s.pending_count == 1).await;
    assert_eq!(snapshot.items[0].id.as_str(), "b");
    sync.close().await;
}

#[tokio::test(start_paused = true)]
async fn close_unsubscribes() {
    let api = Arc::new(FakeApi::with_items(items(&["a"])));
    let dispatcher = EventDispatcher::new();
    let sync = start(&api, &dispatcher);
    assert_eq!(dispatcher.listener_count(), 1);
    sync.close().await;
    assert_eq!(dispatcher.listener_count(), 0);

    dispatcher.dispatch(event(MessageKind::NewItem));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(api.calls() <= 1);
}

#[tokio::test(start_paused = true)]
async fn failed_play_is_returned_and_skips_refetch() {
    let mut mock = MockBanterApi::new();
    let _ = mock.expect_list_items().times(1).returning(|_, _| Ok(Vec::new()));
    let _ = mock
        .expect_mark_played()
        .times(1)
        .returning(|_| Err(ApiError::Status { url: "x".into(), status: 404 }));

    let dispatcher = EventDispatcher::new();
    let sync = QueueSynchronizer::spawn(
        OwnerId::from("o1"),
        &dispatcher,
        Arc::new(mock),
        &DashboardSettings::default(),
    );
    let _ = wait_for(&sync, QueueSnapshot::is_loaded).await;

    let err = sync.play_item(&ItemId::from("gone")).await.unwrap_err();
    assert_matches!(err, ApiError::Status { status: 404, .. });
    tokio::time::sleep(Duration::from_secs(1)).await;
    settle().await;
    sync.close().await;
}
