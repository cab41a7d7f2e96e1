//! Single-slot audio playback.
//!
//! [`AudioCoordinator::play`] supersedes whatever is in the slot, then loads
//! the new source and starts it once the element reports it can play. Each
//! play is tagged with a generation; media events carrying an older
//! generation are discarded, so a late `CanPlay`/`Ended` from a superseded
//! element can never start audio or clear the newer slot.

use std::sync::Arc;

use banter_core::ids::ItemId;
use banter_core::{AudioError, AudioFailureKind};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{MediaBackend, MediaCommand, MediaEvent};
use crate::source::resolve_source;

const EVENT_CAPACITY: usize = 64;

/// The active playback, as observed from outside.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSession {
    /// Audio reference as given to `play`.
    pub audio_url: String,
    /// Item the audio belongs to.
    pub item_id: ItemId,
    /// Volume in `[0, 1]`.
    pub volume: f32,
    /// Audible right now (started and not paused).
    pub playing: bool,
}

/// Slot contents plus the volume future plays start at.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioSnapshot {
    /// Current session, if any.
    pub session: Option<PlaybackSession>,
    /// Persisted volume in `[0, 1]`.
    pub volume: f32,
}

/// Notification about a playback lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum AudioEvent {
    /// Playback began.
    Started {
        /// Item being played.
        item_id: ItemId,
    },
    /// Playback reached the end.
    Finished {
        /// Item that finished.
        item_id: ItemId,
    },
    /// Playback was stopped or superseded.
    Stopped {
        /// Item that was stopped.
        item_id: ItemId,
    },
    /// Loading or playback failed; the slot is empty again.
    Failed {
        /// Item whose audio failed.
        item_id: ItemId,
        /// Failure class.
        kind: AudioFailureKind,
        /// Human-readable cause.
        message: String,
    },
}

struct Slot {
    generation: u64,
    audio_url: String,
    item_id: ItemId,
    volume: f32,
    commands: mpsc::UnboundedSender<MediaCommand>,
    loaded: bool,
    started: bool,
    paused: bool,
}

impl Slot {
    fn playing(&self) -> bool {
        self.started && !self.paused
    }

    fn command(&self, command: MediaCommand) {
        // A closed channel means the element already ended; its event pump
        // reports that.
        let _ = self.commands.send(command);
    }
}

struct State {
    generation: u64,
    volume: f32,
    slot: Option<Slot>,
}

struct Inner {
    backend: Arc<dyn MediaBackend>,
    origin: Url,
    state: Mutex<State>,
    snapshot: watch::Sender<AudioSnapshot>,
    events: broadcast::Sender<AudioEvent>,
}

/// Owner of the single audio slot.
///
/// Cheap to clone; clones share the slot.
#[derive(Clone)]
pub struct AudioCoordinator {
    inner: Arc<Inner>,
}

impl AudioCoordinator {
    /// Create a coordinator that loads through `backend` and resolves
    /// relative audio paths against `origin`.
    pub fn new(backend: Arc<dyn MediaBackend>, origin: Url, volume: f32) -> Self {
        let volume = clamp_volume(volume);
        let (snapshot, _) = watch::channel(AudioSnapshot {
            session: None,
            volume,
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                origin,
                state: Mutex::new(State {
                    generation: 0,
                    volume,
                    slot: None,
                }),
                snapshot,
                events,
            }),
        }
    }

    /// Stop the current slot and start `url` for `item_id` at `volume`.
    ///
    /// `volume` also becomes the persisted volume. Failures are reported as
    /// [`AudioEvent::Failed`], never returned.
    pub fn play(&self, url: &str, item_id: ItemId, volume: f32) {
        let volume = clamp_volume(volume);
        let mut state = self.inner.state.lock();
        state.generation += 1;
        let generation = state.generation;
        state.volume = volume;
        if let Some(previous) = state.slot.take() {
            self.inner.release(previous);
        }

        let source = match resolve_source(url, &self.inner.origin) {
            Ok(source) => source,
            Err(error) => {
                self.inner.fail(item_id, &error);
                self.inner.publish(&state);
                return;
            }
        };

        debug!(item_id = %item_id, %source, generation, "loading audio");
        let handle = self.inner.backend.load(source, volume);
        state.slot = Some(Slot {
            generation,
            audio_url: url.to_owned(),
            item_id,
            volume,
            commands: handle.commands,
            loaded: false,
            started: false,
            paused: false,
        });
        self.inner.publish(&state);
        drop(state);

        let inner = Arc::clone(&self.inner);
        let _ = tokio::spawn(inner.pump(generation, handle.events));
    }

    /// Pause the current slot. Returns `false` when there is nothing to pause.
    pub fn pause(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.slot.as_mut() else {
            return false;
        };
        if slot.paused {
            return false;
        }
        slot.paused = true;
        if slot.started {
            slot.command(MediaCommand::Pause);
        }
        self.inner.publish(&state);
        true
    }

    /// Resume a paused slot. Returns `false` when there is nothing to resume.
    pub fn resume(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.slot.as_mut() else {
            return false;
        };
        if !slot.paused {
            return false;
        }
        slot.paused = false;
        let mut started = None;
        if slot.started {
            slot.command(MediaCommand::Resume);
        } else if slot.loaded {
            slot.command(MediaCommand::Play);
            slot.started = true;
            started = Some(slot.item_id.clone());
        }
        self.inner.publish(&state);
        if let Some(item_id) = started {
            let _ = self.inner.events.send(AudioEvent::Started { item_id });
        }
        true
    }

    /// Stop and clear the slot.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(slot) = state.slot.take() {
            self.inner.release(slot);
            self.inner.publish(&state);
        }
    }

    /// Rescale the active element and persist `volume` for future plays.
    pub fn update_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        let mut state = self.inner.state.lock();
        state.volume = volume;
        if let Some(slot) = state.slot.as_mut() {
            slot.volume = volume;
            slot.command(MediaCommand::SetVolume(volume));
        }
        self.inner.publish(&state);
    }

    /// Whether audio is audible right now.
    pub fn is_playing(&self) -> bool {
        self.inner
            .state
            .lock()
            .slot
            .as_ref()
            .is_some_and(Slot::playing)
    }

    /// Item occupying the slot (loading, playing or paused).
    pub fn current_id(&self) -> Option<ItemId> {
        self.inner
            .state
            .lock()
            .slot
            .as_ref()
            .map(|slot| slot.item_id.clone())
    }

    /// Persisted volume.
    pub fn volume(&self) -> f32 {
        self.inner.state.lock().volume
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> AudioSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Watch slot changes.
    pub fn watch(&self) -> watch::Receiver<AudioSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<AudioEvent> {
        self.inner.events.subscribe()
    }
}

impl std::fmt::Debug for AudioCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCoordinator")
            .field("origin", &self.inner.origin.as_str())
            .field("current", &self.current_id())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn pump(self: Arc<Self>, generation: u64, mut events: mpsc::UnboundedReceiver<MediaEvent>) {
        while let Some(event) = events.recv().await {
            if !self.on_media_event(generation, event) {
                return;
            }
        }
        // Element went away without a terminal event.
        let mut state = self.state.lock();
        if let Some(slot) = state.slot.take_if(|slot| slot.generation == generation) {
            let error = AudioError::Playback {
                reason: "media element closed unexpectedly".into(),
            };
            self.fail(slot.item_id, &error);
            self.publish(&state);
        }
    }

    /// Apply one media event. Returns `false` once the pump should stop.
    fn on_media_event(&self, generation: u64, event: MediaEvent) -> bool {
        let mut state = self.state.lock();
        let Some(slot) = state
            .slot
            .as_mut()
            .filter(|slot| slot.generation == generation)
        else {
            debug!(generation, ?event, "ignoring media event from superseded playback");
            return false;
        };

        match event {
            MediaEvent::CanPlay => {
                slot.loaded = true;
                if !slot.paused && !slot.started {
                    slot.command(MediaCommand::Play);
                    slot.started = true;
                    info!(item_id = %slot.item_id, "audio playback started");
                    let _ = self.events.send(AudioEvent::Started {
                        item_id: slot.item_id.clone(),
                    });
                }
                self.publish(&state);
                true
            }
            MediaEvent::Ended => {
                if let Some(slot) = state.slot.take() {
                    debug!(item_id = %slot.item_id, "audio playback finished");
                    let _ = self.events.send(AudioEvent::Finished {
                        item_id: slot.item_id,
                    });
                }
                self.publish(&state);
                false
            }
            MediaEvent::Error(error) => {
                if let Some(slot) = state.slot.take() {
                    self.fail(slot.item_id, &error);
                }
                self.publish(&state);
                false
            }
        }
    }

    fn release(&self, slot: Slot) {
        slot.command(MediaCommand::Stop);
        debug!(item_id = %slot.item_id, generation = slot.generation, "audio slot released");
        let _ = self.events.send(AudioEvent::Stopped {
            item_id: slot.item_id,
        });
    }

    fn fail(&self, item_id: ItemId, error: &AudioError) {
        let kind = error.kind();
        warn!(item_id = %item_id, ?kind, error = %error, "audio failed");
        let _ = self.events.send(AudioEvent::Failed {
            item_id,
            kind,
            message: error.to_string(),
        });
    }

    fn publish(&self, state: &State) {
        let session = state.slot.as_ref().map(|slot| PlaybackSession {
            audio_url: slot.audio_url.clone(),
            item_id: slot.item_id.clone(),
            volume: slot.volume,
            playing: slot.playing(),
        });
        let _ = self.snapshot.send_replace(AudioSnapshot {
            session,
            volume: state.volume,
        });
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
