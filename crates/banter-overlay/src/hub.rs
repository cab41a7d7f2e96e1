//! Per-owner overlay lifecycle.
//!
//! The first capture client for an owner fetches the owner's preferences,
//! leases the owner's socket and starts an [`OverlayController`]. Later
//! clients share it. When the last client detaches, timers are cancelled,
//! audio stops and the socket lease is released.

use std::sync::Arc;

use banter_api::BanterApi;
use banter_core::ConnectionError;
use banter_core::ids::OwnerId;
use banter_settings::OverlaySettings;
use banter_socket::{SocketLease, SocketRegistry};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::audio::AudioCoordinator;
use crate::backend::MediaBackend;
use crate::controller::OverlayController;
use crate::presentation::{DisplayWindow, PresentationConfig};

/// One owner's running overlay.
#[derive(Debug)]
pub struct Overlay {
    owner: OwnerId,
    settings: OverlaySettings,
    controller: OverlayController,
    lease: SocketLease,
}

impl Overlay {
    /// Owner shown by this overlay.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Effective settings (local settings with owner preferences applied).
    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    /// The presentation driver.
    pub fn controller(&self) -> &OverlayController {
        &self.controller
    }

    /// The shared socket lease.
    pub fn lease(&self) -> &SocketLease {
        &self.lease
    }
}

struct Attached {
    overlay: Arc<Overlay>,
    clients: usize,
}

/// Owner → overlay map.
pub struct OverlayHub {
    sockets: Arc<SocketRegistry>,
    api: Arc<dyn BanterApi>,
    backend: Arc<dyn MediaBackend>,
    origin: Url,
    defaults: OverlaySettings,
    overlays: DashMap<OwnerId, Attached>,
}

impl std::fmt::Debug for OverlayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayHub")
            .field("origin", &self.origin.as_str())
            .field("overlays", &self.overlays.len())
            .finish_non_exhaustive()
    }
}

impl OverlayHub {
    /// Create a hub. `origin` resolves relative audio paths.
    pub fn new(
        sockets: Arc<SocketRegistry>,
        api: Arc<dyn BanterApi>,
        backend: Arc<dyn MediaBackend>,
        origin: Url,
        defaults: OverlaySettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            sockets,
            api,
            backend,
            origin,
            defaults,
            overlays: DashMap::new(),
        })
    }

    /// Attach a capture client for `owner`.
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn attach(self: &Arc<Self>, owner: &OwnerId) -> Result<OverlayClient, ConnectionError> {
        if let Some(overlay) = self.join_existing(owner) {
            return Ok(self.client(overlay));
        }

        let settings = match self.api.overlay_preferences(owner).await {
            Ok(prefs) => prefs.apply_to(&self.defaults),
            Err(error) => {
                warn!(error = %error, "owner preferences unavailable, using local settings");
                self.defaults.clone()
            }
        };

        let overlay = match self.overlays.entry(owner.clone()) {
            Entry::Occupied(mut entry) => {
                // Another client won the race while preferences were loading.
                let attached = entry.get_mut();
                attached.clients += 1;
                Arc::clone(&attached.overlay)
            }
            Entry::Vacant(entry) => {
                let overlay = Arc::new(self.start(owner, settings)?);
                let _ = entry.insert(Attached {
                    overlay: Arc::clone(&overlay),
                    clients: 1,
                });
                overlay
            }
        };
        Ok(self.client(overlay))
    }

    /// Number of client attachments for `owner`.
    pub fn client_count(&self, owner: &OwnerId) -> usize {
        self.overlays.get(owner).map_or(0, |a| a.clients)
    }

    /// Number of running overlays.
    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    /// Whether no overlay is running.
    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Tear down every overlay, wait for the drivers to finish, then close
    /// every socket normally. Clients still attached become inert.
    pub async fn close(&self) {
        let overlays: Vec<Arc<Overlay>> = self
            .overlays
            .iter()
            .map(|entry| Arc::clone(&entry.overlay))
            .collect();
        self.overlays.clear();
        for overlay in overlays {
            overlay.controller.close().await;
        }
        self.sockets.close_all().await;
    }

    fn join_existing(&self, owner: &OwnerId) -> Option<Arc<Overlay>> {
        let mut attached = self.overlays.get_mut(owner)?;
        attached.clients += 1;
        debug!(clients = attached.clients, "joining running overlay");
        Some(Arc::clone(&attached.overlay))
    }

    fn start(&self, owner: &OwnerId, settings: OverlaySettings) -> Result<Overlay, ConnectionError> {
        let lease = self.sockets.acquire(owner)?;
        let audio = AudioCoordinator::new(
            Arc::clone(&self.backend),
            self.origin.clone(),
            f32::from(settings.volume) / 100.0,
        );
        let controller =
            OverlayController::spawn(lease.dispatcher(), PresentationConfig::from(&settings), audio);
        info!(
            display_ms = settings.display_duration_ms,
            animation = %settings.animation,
            auto_play = settings.auto_play,
            "overlay started"
        );
        Ok(Overlay {
            owner: owner.clone(),
            settings,
            controller,
            lease,
        })
    }

    fn client(self: &Arc<Self>, overlay: Arc<Overlay>) -> OverlayClient {
        OverlayClient {
            overlay,
            hub: Arc::clone(self),
        }
    }

    fn detach(&self, overlay: &Arc<Overlay>) {
        let owner = &overlay.owner;
        if let Entry::Occupied(mut entry) = self.overlays.entry(owner.clone()) {
            let attached = entry.get_mut();
            if !Arc::ptr_eq(&attached.overlay, overlay) {
                debug!(owner = %owner, "stale client left, overlay was replaced");
                return;
            }
            attached.clients = attached.clients.saturating_sub(1);
            if attached.clients == 0 {
                let (_, attached) = entry.remove_entry();
                info!(owner = %owner, "last capture client left, tearing overlay down");
                attached.overlay.controller.shutdown();
            }
        }
    }
}

/// A capture client's hold on an overlay. Dropping it detaches.
#[derive(Debug)]
pub struct OverlayClient {
    overlay: Arc<Overlay>,
    hub: Arc<OverlayHub>,
}

impl OverlayClient {
    /// The shared overlay.
    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Watch the display window.
    pub fn watch(&self) -> watch::Receiver<DisplayWindow> {
        self.overlay.controller.watch()
    }
}

impl Drop for OverlayClient {
    fn drop(&mut self) {
        self.hub.detach(&self.overlay);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
