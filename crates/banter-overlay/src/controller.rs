//! Async driver for the presentation state machine.
//!
//! One task per overlay: it owns the [`PresentationMachine`], consumes the
//! dispatcher feed, runs timers as abortable tasks tagged with the machine
//! generation, starts audio through the [`AudioCoordinator`] and publishes
//! the window on a `watch` channel.

use std::sync::Arc;

use banter_core::InboundMessage;
use banter_socket::{EventDispatcher, Subscription};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::audio::AudioCoordinator;
use crate::presentation::{DisplayWindow, Effect, PresentationConfig, PresentationMachine, TimerKind};

/// Running overlay presentation.
pub struct OverlayController {
    window: watch::Receiver<DisplayWindow>,
    audio: AudioCoordinator,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OverlayController {
    /// Subscribe to `dispatcher` and start presenting.
    ///
    /// The subscription is registered before this returns, so nothing
    /// dispatched afterwards is missed.
    pub fn spawn(
        dispatcher: &EventDispatcher,
        config: PresentationConfig,
        audio: AudioCoordinator,
    ) -> Self {
        let (subscription, feed) = dispatcher.subscribe_channel();
        let (window_tx, window) = watch::channel(DisplayWindow::default());
        let cancel = CancellationToken::new();

        let driver = Driver {
            machine: PresentationMachine::new(config),
            audio: audio.clone(),
            window: window_tx,
            timer: None,
        };
        let task = tokio::spawn(driver.run(subscription, feed, cancel.clone()));

        Self {
            window,
            audio,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Watch the display window.
    pub fn watch(&self) -> watch::Receiver<DisplayWindow> {
        self.window.clone()
    }

    /// Current display window.
    pub fn window(&self) -> DisplayWindow {
        self.window.borrow().clone()
    }

    /// Audio slot used by this overlay.
    pub fn audio(&self) -> &AudioCoordinator {
        &self.audio
    }

    /// Request teardown without waiting for it.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Tear down: cancel timers, stop audio, unsubscribe.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for OverlayController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for OverlayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayController")
            .field("window", &*self.window.borrow())
            .finish_non_exhaustive()
    }
}

struct Driver {
    machine: PresentationMachine,
    audio: AudioCoordinator,
    window: watch::Sender<DisplayWindow>,
    timer: Option<JoinHandle<()>>,
}

impl Driver {
    #[instrument(skip_all, name = "overlay")]
    async fn run(
        mut self,
        subscription: Subscription,
        mut feed: mpsc::UnboundedReceiver<Arc<InboundMessage>>,
        cancel: CancellationToken,
    ) {
        let (fired_tx, mut fired) = mpsc::unbounded_channel::<(u64, TimerKind)>();

        loop {
            let effects = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some((generation, kind)) = fired.recv() => self.machine.on_timer(generation, kind),
                message = feed.recv() => match message {
                    Some(message) => self.machine.on_message(&message),
                    None => break,
                },
            };
            self.apply(effects, &fired_tx);
        }

        let effects = self.machine.teardown();
        self.apply(effects, &fired_tx);
        self.audio.stop();
        subscription.unsubscribe();
        debug!("overlay torn down");
    }

    fn apply(&mut self, effects: Vec<Effect>, fired: &mpsc::UnboundedSender<(u64, TimerKind)>) {
        for effect in effects {
            match effect {
                Effect::CancelTimer => {
                    if let Some(timer) = self.timer.take() {
                        timer.abort();
                    }
                }
                Effect::ArmTimer {
                    generation,
                    kind,
                    after,
                } => {
                    if let Some(stale) = self.timer.take() {
                        stale.abort();
                    }
                    let fired = fired.clone();
                    self.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = fired.send((generation, kind));
                    }));
                }
                Effect::PlayAudio { url, item_id } => {
                    self.audio.play(&url, item_id, self.audio.volume());
                }
            }
        }
        let window = self.machine.window();
        let _ = self.window.send_if_modified(|current| {
            if current == window {
                false
            } else {
                current.clone_from(window);
                true
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
