//! Queue synchronizer.
//!
//! Keeps a cached, server-ordered item list for one owner. Every
//! queue-affecting socket event and every poll tick invalidates the cache and
//! refetches the whole list; nothing is patched locally. At most one fetch is
//! in flight; requests arriving meanwhile collapse into a single follow-up.
//! A failed fetch keeps the last good list.

use std::sync::Arc;
use std::time::Duration;

use banter_api::BanterApi;
use banter_core::ids::{ItemId, OwnerId};
use banter_core::messages::{DisplayableItem, InboundMessage};
use banter_core::ApiError;
use banter_settings::DashboardSettings;
use banter_socket::{EventDispatcher, Subscription};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Published view of the queue.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueSnapshot {
    /// Items from the freshest successful fetch, in server order.
    pub items: Vec<DisplayableItem>,
    /// Unplayed items in `items`.
    pub pending_count: usize,
    /// Sequence number of the fetch `items` came from (0 = never fetched).
    pub fetch_seq: u64,
    /// When `items` was fetched.
    pub fetched_at: Option<Instant>,
    /// Error of the most recent fetch, cleared by the next success.
    pub last_error: Option<String>,
    /// Fetches started so far.
    pub fetches_started: u64,
}

impl QueueSnapshot {
    /// Whether at least one fetch has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.fetch_seq > 0
    }
}

/// Fetch bookkeeping: one in flight, one pending, newest wins.
#[derive(Debug, Default)]
pub struct FetchState {
    next_seq: u64,
    applied_seq: u64,
    in_flight: Option<u64>,
    pending: bool,
}

impl FetchState {
    /// Ask for a refetch. Returns the sequence number to fetch with now, or
    /// `None` when the request was folded into a pending follow-up.
    pub fn request(&mut self) -> Option<u64> {
        if self.in_flight.is_some() {
            self.pending = true;
            return None;
        }
        Some(self.begin())
    }

    /// Record completion of fetch `seq`. Returns whether its result is newer
    /// than anything applied so far, plus the follow-up to start, if any.
    pub fn complete(&mut self, seq: u64) -> (bool, Option<u64>) {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
        }
        let fresh = seq > self.applied_seq;
        let follow_up = if self.in_flight.is_none() && std::mem::take(&mut self.pending) {
            Some(self.begin())
        } else {
            None
        };
        (fresh, follow_up)
    }

    /// Mark `seq` as applied.
    pub fn applied(&mut self, seq: u64) {
        self.applied_seq = self.applied_seq.max(seq);
    }

    /// Whether a fetch is running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    fn begin(&mut self) -> u64 {
        self.next_seq += 1;
        self.in_flight = Some(self.next_seq);
        self.next_seq
    }
}

type FetchResult = (u64, Result<Vec<DisplayableItem>, ApiError>);

/// Live item list for one owner.
pub struct QueueSynchronizer {
    owner: OwnerId,
    api: Arc<dyn BanterApi>,
    snapshot: watch::Receiver<QueueSnapshot>,
    invalidate: mpsc::UnboundedSender<()>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QueueSynchronizer {
    /// Subscribe to `dispatcher` and start syncing. The first fetch starts
    /// immediately.
    pub fn spawn(
        owner: OwnerId,
        dispatcher: &EventDispatcher,
        api: Arc<dyn BanterApi>,
        settings: &DashboardSettings,
    ) -> Self {
        let (subscription, feed) = dispatcher.subscribe_channel();
        let (snapshot_tx, snapshot) = watch::channel(QueueSnapshot::default());
        let (invalidate, invalidate_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker = Worker {
            owner: owner.clone(),
            api: Arc::clone(&api),
            unplayed_only: settings.unplayed_only,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
            fetch: FetchState::default(),
            snapshot: snapshot_tx,
        };
        let task = tokio::spawn(worker.run(subscription, feed, invalidate_rx, cancel.clone()));

        Self {
            owner,
            api,
            snapshot,
            invalidate,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Owner being synced.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch snapshot changes.
    pub fn watch(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshot.clone()
    }

    /// Unplayed count from the freshest successful fetch.
    pub fn pending_count(&self) -> usize {
        self.snapshot.borrow().pending_count
    }

    /// Request a refetch.
    pub fn invalidate(&self) {
        let _ = self.invalidate.send(());
    }

    /// Manually play `item`: mark it played server-side, then refetch.
    #[instrument(skip_all, fields(owner = %self.owner, item_id = %item))]
    pub async fn play_item(&self, item: &ItemId) -> Result<(), ApiError> {
        self.api.mark_played(item).await?;
        info!("item played from dashboard");
        self.invalidate();
        Ok(())
    }

    /// Stop syncing and wait for the worker to exit.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for QueueSynchronizer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for QueueSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSynchronizer")
            .field("owner", &self.owner)
            .field("pending_count", &self.pending_count())
            .finish_non_exhaustive()
    }
}

struct Worker {
    owner: OwnerId,
    api: Arc<dyn BanterApi>,
    unplayed_only: bool,
    poll_interval: Duration,
    fetch: FetchState,
    snapshot: watch::Sender<QueueSnapshot>,
}

impl Worker {
    #[instrument(skip_all, name = "queue", fields(owner = %self.owner))]
    async fn run(
        mut self,
        subscription: Subscription,
        mut feed: mpsc::UnboundedReceiver<Arc<InboundMessage>>,
        mut invalidate: mpsc::UnboundedReceiver<()>,
        cancel: CancellationToken,
    ) {
        let (done_tx, mut done) = mpsc::unbounded_channel::<FetchResult>();
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some((seq, result)) = done.recv() => self.on_fetched(seq, result, &done_tx),
                Some(message) = feed.recv() => {
                    if message.kind.affects_queue() {
                        debug!(kind = message.kind.as_str(), "queue invalidated by event");
                        self.request(&done_tx);
                    } else {
                        trace!(kind = message.kind.as_str(), "event does not affect queue");
                    }
                }
                Some(()) = invalidate.recv() => self.request(&done_tx),
                _ = poll.tick() => {
                    trace!("poll tick");
                    self.request(&done_tx);
                }
            }
        }

        subscription.unsubscribe();
        debug!("queue synchronizer stopped");
    }

    fn request(&mut self, done: &mpsc::UnboundedSender<FetchResult>) {
        match self.fetch.request() {
            Some(seq) => self.start(seq, done),
            None => trace!("fetch in flight, refetch coalesced"),
        }
    }

    fn start(&mut self, seq: u64, done: &mpsc::UnboundedSender<FetchResult>) {
        let api = Arc::clone(&self.api);
        let owner = self.owner.clone();
        let unplayed_only = self.unplayed_only;
        let done = done.clone();
        let _ = tokio::spawn(async move {
            let result = api.list_items(&owner, unplayed_only).await;
            let _ = done.send((seq, result));
        });
        self.snapshot.send_modify(|s| s.fetches_started += 1);
    }

    fn on_fetched(
        &mut self,
        seq: u64,
        result: Result<Vec<DisplayableItem>, ApiError>,
        done: &mpsc::UnboundedSender<FetchResult>,
    ) {
        let (fresh, follow_up) = self.fetch.complete(seq);
        if fresh {
            match result {
                Ok(items) => {
                    self.fetch.applied(seq);
                    let pending_count = items.iter().filter(|item| !item.is_played).count();
                    debug!(seq, pending_count, total = items.len(), "queue refreshed");
                    self.snapshot.send_modify(|s| {
                        s.items = items;
                        s.pending_count = pending_count;
                        s.fetch_seq = seq;
                        s.fetched_at = Some(Instant::now());
                        s.last_error = None;
                    });
                }
                Err(error) => {
                    warn!(seq, error = %error, "queue refetch failed, keeping last good list");
                    self.snapshot.send_modify(|s| s.last_error = Some(error.to_string()));
                }
            }
        } else {
            debug!(seq, "discarding stale fetch result");
        }
        if let Some(seq) = follow_up {
            self.start(seq, done);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
