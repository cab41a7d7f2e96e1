//! # banter
//!
//! Banter live client binary. `overlay` serves the capture surface for
//! broadcast software; `dashboard` keeps one owner's queue in sync and
//! reports the pending count.

#![deny(unsafe_code)]

mod shutdown;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use banter_api::{BanterApi, HttpApi};
use banter_core::ids::{ItemId, OwnerId};
use banter_core::logging::{self, LogFormat};
use banter_overlay::{ClockBackend, MediaBackend, OverlayHub};
use banter_settings::BanterSettings;
use banter_socket::{Connector, SocketRegistry, TungsteniteConnector};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use crate::shutdown::ShutdownCoordinator;

/// Banter live client.
#[derive(Parser, Debug)]
#[command(name = "banter", about = "Banter live overlay and dashboard client")]
struct Cli {
    /// Settings file (defaults to `~/.banter/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON-lines logs.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the capture surface.
    Overlay {
        /// Start this owner's overlay before any capture client connects.
        #[arg(long)]
        owner: Option<String>,

        /// Port to bind (overrides settings).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Follow one owner's queue.
    Dashboard {
        /// Owner whose queue to follow.
        #[arg(long)]
        owner: String,

        /// Mark this item played once the queue has loaded.
        #[arg(long)]
        play: Option<String>,
    },
}

fn owner_arg(raw: &str) -> Result<OwnerId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("owner must not be blank");
    }
    Ok(OwnerId::from(trimmed))
}

fn load(cli: &Cli) -> Result<BanterSettings> {
    let mut settings = match &cli.settings {
        Some(path) => banter_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => banter_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
    Ok(settings)
}

fn registry(settings: &BanterSettings) -> Arc<SocketRegistry> {
    let connector: Arc<dyn Connector> = Arc::new(TungsteniteConnector);
    SocketRegistry::new(
        settings.server.clone(),
        settings.connection.clone(),
        connector,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;
    logging::init(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let coordinator = ShutdownCoordinator::new();
    let _ = coordinator.cancel_on_ctrl_c();

    match cli.command {
        Command::Overlay { owner, port } => {
            let owner = owner.as_deref().map(owner_arg).transpose()?;
            run_overlay(&settings, owner, port, &coordinator).await
        }
        Command::Dashboard { owner, play } => {
            let owner = owner_arg(&owner)?;
            let play = play.map(ItemId::from);
            run_dashboard(&settings, owner, play, &coordinator).await
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Overlay
// ─────────────────────────────────────────────────────────────────────────────

async fn run_overlay(
    settings: &BanterSettings,
    owner: Option<OwnerId>,
    port: Option<u16>,
    coordinator: &ShutdownCoordinator,
) -> Result<()> {
    let origin = Url::parse(&settings.server.base_url)
        .with_context(|| format!("Invalid server base URL: {}", settings.server.base_url))?;
    let api: Arc<dyn BanterApi> =
        Arc::new(HttpApi::new(&settings.server.base_url).context("Failed to build API client")?);
    let backend: Arc<dyn MediaBackend> = Arc::new(ClockBackend::default());
    let hub = OverlayHub::new(
        registry(settings),
        api,
        backend,
        origin,
        settings.overlay.clone(),
    );

    // Held for the whole run so the overlay survives capture-client churn.
    let warm = match &owner {
        Some(owner) => Some(
            hub.attach(owner)
                .await
                .with_context(|| format!("Failed to start overlay for {owner}"))?,
        ),
        None => None,
    };

    let addr: SocketAddr = format!(
        "{}:{}",
        settings.overlay.surface_host,
        port.unwrap_or(settings.overlay.surface_port)
    )
    .parse()
    .context("Invalid surface address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind capture surface on {addr}"))?;

    let server = tokio::spawn(serve_surface(listener, Arc::clone(&hub), coordinator.token()));

    coordinator.token().cancelled().await;
    drop(warm);
    hub.close().await;
    let _ = coordinator
        .graceful_shutdown(vec![("capture surface", server)], None)
        .await;
    info!("overlay stopped");
    Ok(())
}

async fn serve_surface(listener: TcpListener, hub: Arc<OverlayHub>, token: CancellationToken) {
    if let Err(e) = banter_overlay::serve(listener, hub, token.clone()).await {
        error!(error = %e, "capture surface failed");
        token.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dashboard
// ─────────────────────────────────────────────────────────────────────────────

async fn run_dashboard(
    settings: &BanterSettings,
    owner: OwnerId,
    mut play: Option<ItemId>,
    coordinator: &ShutdownCoordinator,
) -> Result<()> {
    let api: Arc<dyn BanterApi> =
        Arc::new(HttpApi::new(&settings.server.base_url).context("Failed to build API client")?);
    let sockets = registry(settings);
    let lease = sockets
        .acquire(&owner)
        .with_context(|| format!("Failed to open live socket for {owner}"))?;
    let sync = banter_dashboard::QueueSynchronizer::spawn(
        owner.clone(),
        lease.dispatcher(),
        api,
        &settings.dashboard,
    );

    let token = coordinator.token();
    let mut queue = sync.watch();
    let mut status = lease.manager().watch_status();
    let mut reported: Option<usize> = None;
    let mut outcome = Ok(());

    loop {
        let snapshot = queue.borrow_and_update().clone();
        if snapshot.is_loaded() {
            if reported != Some(snapshot.pending_count) {
                info!(owner = %owner, pending = snapshot.pending_count, "queue updated");
                reported = Some(snapshot.pending_count);
            }
            if let Some(item) = play.take() {
                if let Err(e) = sync.play_item(&item).await {
                    warn!(item_id = %item, error = %e, "manual play failed");
                }
            }
        }

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            changed = status.changed() => {
                let terminal = changed.is_err() || status.borrow_and_update().terminal;
                if terminal {
                    outcome = Err(anyhow::anyhow!("live socket for {owner} gave up reconnecting"));
                    break;
                }
            }
            changed = queue.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    sync.close().await;
    lease.manager().close().await;
    drop(lease);
    sockets.close_all().await;
    coordinator.shutdown();
    info!(owner = %owner, "dashboard stopped");
    outcome
}
