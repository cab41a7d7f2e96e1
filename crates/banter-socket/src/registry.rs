//! One shared connection per owner.
//!
//! Consumers acquire a [`SocketLease`] instead of building their own manager.
//! The first lease for an owner creates and opens the connection; later
//! leases share it; dropping the last lease shuts it down with a normal
//! close.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use banter_core::ConnectionError;
use banter_core::ids::OwnerId;
use banter_settings::{ConnectionSettings, ServerSettings};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::connection::ConnectionManager;
use crate::dispatcher::EventDispatcher;
use crate::transport::Connector;

struct Shared {
    generation: u64,
    manager: ConnectionManager,
    leases: usize,
}

/// Owner → shared connection map.
pub struct SocketRegistry {
    server: ServerSettings,
    connection: ConnectionSettings,
    connector: Arc<dyn Connector>,
    sockets: DashMap<OwnerId, Shared>,
    generations: AtomicU64,
}

impl std::fmt::Debug for SocketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketRegistry")
            .field("base_url", &self.server.base_url)
            .field("owners", &self.sockets.len())
            .finish_non_exhaustive()
    }
}

impl SocketRegistry {
    /// Create a registry.
    pub fn new(
        server: ServerSettings,
        connection: ConnectionSettings,
        connector: Arc<dyn Connector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            server,
            connection,
            connector,
            sockets: DashMap::new(),
            generations: AtomicU64::new(0),
        })
    }

    /// Lease the connection for `owner`, creating and opening it if needed.
    pub fn acquire(self: &Arc<Self>, owner: &OwnerId) -> Result<SocketLease, ConnectionError> {
        let (generation, manager) = match self.sockets.entry(owner.clone()) {
            Entry::Occupied(mut entry) => {
                let shared = entry.get_mut();
                shared.leases += 1;
                debug!(owner = %owner, leases = shared.leases, "sharing socket");
                (shared.generation, shared.manager.clone())
            }
            Entry::Vacant(entry) => {
                let config = ConnectionConfig::for_owner(&self.server, &self.connection, owner)?;
                let manager = ConnectionManager::new(
                    config,
                    Arc::clone(&self.connector),
                    EventDispatcher::new(),
                );
                manager.open();
                info!(owner = %owner, url = %manager.url(), "socket created");
                let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                let _ = entry.insert(Shared {
                    generation,
                    manager: manager.clone(),
                    leases: 1,
                });
                (generation, manager)
            }
        };

        Ok(SocketLease {
            owner: owner.clone(),
            generation,
            manager,
            registry: Arc::clone(self),
        })
    }

    /// Live lease count for `owner`.
    pub fn lease_count(&self, owner: &OwnerId) -> usize {
        self.sockets.get(owner).map_or(0, |s| s.leases)
    }

    /// Number of owners with a live connection.
    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    /// Whether no connection is live.
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Close every connection and wait for each to send its normal closure.
    /// Leases still outstanding become inert: dropping them later leaves any
    /// newer connection for the same owner alone.
    pub async fn close_all(&self) {
        let managers: Vec<ConnectionManager> = self
            .sockets
            .iter()
            .map(|entry| entry.manager.clone())
            .collect();
        self.sockets.clear();
        for manager in managers {
            manager.close().await;
        }
    }

    fn release(&self, owner: &OwnerId, generation: u64) {
        if let Entry::Occupied(mut entry) = self.sockets.entry(owner.clone()) {
            let shared = entry.get_mut();
            if shared.generation != generation {
                debug!(owner = %owner, "stale lease released, socket was replaced");
                return;
            }
            shared.leases = shared.leases.saturating_sub(1);
            if shared.leases == 0 {
                let (_, shared) = entry.remove_entry();
                info!(owner = %owner, "last lease released, closing socket");
                shared.manager.shutdown();
            }
        }
    }
}

/// Shared access to one owner's connection. Dropping it releases the lease.
#[derive(Debug)]
pub struct SocketLease {
    owner: OwnerId,
    generation: u64,
    manager: ConnectionManager,
    registry: Arc<SocketRegistry>,
}

impl SocketLease {
    /// Owner this lease belongs to.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// The shared connection.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// The shared connection's dispatcher.
    pub fn dispatcher(&self) -> &EventDispatcher {
        self.manager.dispatcher()
    }
}

impl Drop for SocketLease {
    fn drop(&mut self) {
        self.registry.release(&self.owner, self.generation);
    }
}
