//! Socket lifecycle: connect, heartbeat, dispatch, reconnect.
//!
//! A [`ConnectionManager`] owns one logical connection for one owner. Its run
//! loop connects through a [`Connector`], answers server pings, hands every
//! other message to the [`EventDispatcher`], and after a close either stays
//! closed (normal close, shutdown), reconnects on the backoff schedule, or
//! gives up once the attempt ceiling is reached.
//!
//! State is published on a `watch` channel and transitions on a `broadcast`
//! channel so consumers can observe without polling.

use std::sync::Arc;
use std::time::Duration;

use banter_core::close::{ABNORMAL_CLOSURE, HEARTBEAT_TIMEOUT, NORMAL_CLOSURE};
use banter_core::{InboundMessage, MessageKind, OutboundMessage};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ConnectionConfig;
use crate::dispatcher::EventDispatcher;
use crate::heartbeat::HeartbeatMonitor;
use crate::reconnect::ReconnectDecision;
use crate::transport::{Connector, OutboundFrame, SocketChannel, TransportEvent};

const EVENT_CAPACITY: usize = 64;

/// Coarse socket state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Frames flow both ways.
    Open,
    /// Close requested locally.
    Closing,
    /// No socket.
    #[default]
    Closed,
}

/// Snapshot of the connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub attempt: u32,
    /// Last server heartbeat while open.
    pub last_heartbeat: Option<Instant>,
    /// Close code of the previous socket.
    pub last_close_code: Option<u16>,
    /// The manager gave up; nothing more will happen without a new manager.
    pub terminal: bool,
}

/// Lifecycle transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Socket opened.
    Opened,
    /// Socket closed with a code.
    Closed {
        /// Close code.
        code: u16,
    },
    /// Another connect will be tried after `delay`.
    ReconnectScheduled {
        /// One-based attempt number.
        attempt: u32,
        /// Wait before connecting.
        delay: Duration,
        /// Code that triggered the retry.
        code: u16,
    },
    /// No heartbeat within tolerance; the socket is being force-closed.
    HeartbeatExpired,
    /// Attempt ceiling reached.
    GaveUp {
        /// Attempts made.
        attempts: u32,
    },
}

struct Inner {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    heartbeat: HeartbeatMonitor,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    outbound: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one managed connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.config.url.as_str())
            .field("status", &*self.inner.status.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager. Nothing connects until [`open`](Self::open).
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_tolerance);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                dispatcher,
                heartbeat,
                status,
                events,
                outbound: Mutex::new(None),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Start the run loop. Calling it again while running is a no-op.
    pub fn open(&self) {
        let mut task = self.inner.task.lock();
        if task.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }
        *task = Some(tokio::spawn(Arc::clone(&self.inner).run()));
    }

    /// Queue a message. Returns `false` (and sends nothing) unless the socket
    /// is open and the queue has room.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        if self.inner.status.borrow().state != ConnectionState::Open {
            return false;
        }
        let Some(tx) = self.inner.outbound.lock().clone() else {
            return false;
        };
        match message.to_json() {
            Ok(json) => tx.try_send(OutboundFrame::Text(json)).is_ok(),
            Err(e) => {
                warn!(error = %e, kind = %message.kind, "failed to serialize outbound message");
                false
            }
        }
    }

    /// Current snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Subscribe to lifecycle transitions.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Dispatcher that receives this connection's messages.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    /// Socket URL.
    pub fn url(&self) -> &url::Url {
        &self.inner.config.url
    }

    /// Request shutdown without waiting. The run loop closes the socket
    /// with 1000 and never reconnects.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Shut down and wait for the run loop to finish.
    pub async fn close(&self) {
        self.shutdown();
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "connection task ended abnormally");
            }
        }
    }
}

impl Inner {
    #[instrument(skip_all, fields(url = %self.config.url))]
    async fn run(self: Arc<Self>) {
        let mut attempts: u32 = 0;

        loop {
            self.update(|s| {
                s.state = ConnectionState::Connecting;
                s.attempt = attempts;
            });

            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.connector.connect(&self.config.url, self.config.outbound_buffer) => result,
            };

            let code = match connected {
                Ok(channel) => {
                    attempts = 0;
                    self.session(channel).await
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempts, "socket connect failed");
                    ABNORMAL_CLOSURE
                }
            };

            if self.cancel.is_cancelled() {
                break;
            }

            match self.config.policy.decide(code, attempts) {
                ReconnectDecision::Stop => {
                    info!(code, "socket closed normally, not reconnecting");
                    break;
                }
                ReconnectDecision::GiveUp { attempts } => {
                    error!(code, attempts, "reconnect attempts exhausted, giving up");
                    self.update(|s| {
                        s.state = ConnectionState::Closed;
                        s.terminal = true;
                    });
                    let _ = self.events.send(ConnectionEvent::GaveUp { attempts });
                    return;
                }
                ReconnectDecision::Retry { delay } => {
                    attempts += 1;
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    info!(code, attempt = attempts, delay_ms, "reconnect scheduled");
                    self.update(|s| {
                        s.state = ConnectionState::Closed;
                        s.attempt = attempts;
                    });
                    let _ = self.events.send(ConnectionEvent::ReconnectScheduled {
                        attempt: attempts,
                        delay,
                        code,
                    });
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.update(|s| s.state = ConnectionState::Closed);
        debug!("connection loop finished");
    }

    /// Drive one open socket until it closes; returns the close code.
    async fn session(&self, channel: SocketChannel) -> u16 {
        let SocketChannel {
            outbound,
            mut inbound,
        } = channel;

        self.heartbeat.reset();
        *self.outbound.lock() = Some(outbound.clone());
        self.update(|s| {
            s.state = ConnectionState::Open;
            s.attempt = 0;
            s.last_heartbeat = Some(self.heartbeat.last_beat());
        });
        let _ = self.events.send(ConnectionEvent::Opened);
        info!("socket open");

        let mut health = tokio::time::interval_at(
            Instant::now() + self.config.health_check_interval,
            self.config.health_check_interval,
        );
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let code = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.update(|s| s.state = ConnectionState::Closing);
                    let _ = outbound.try_send(OutboundFrame::Close(NORMAL_CLOSURE));
                    break NORMAL_CLOSURE;
                }
                event = inbound.recv() => match event {
                    Some(TransportEvent::Text(text)) => self.handle_frame(&text, &outbound),
                    Some(TransportEvent::Closed { code }) => break code,
                    None => break ABNORMAL_CLOSURE,
                },
                _ = health.tick() => {
                    if self.heartbeat.is_expired() {
                        #[allow(clippy::cast_possible_truncation)]
                        let silence_ms = self.heartbeat.silence().as_millis() as u64;
                        warn!(silence_ms, "no heartbeat within tolerance, closing socket");
                        let _ = self.events.send(ConnectionEvent::HeartbeatExpired);
                        self.update(|s| s.state = ConnectionState::Closing);
                        let _ = outbound.try_send(OutboundFrame::Close(HEARTBEAT_TIMEOUT));
                        break HEARTBEAT_TIMEOUT;
                    }
                }
            }
        };

        *self.outbound.lock() = None;
        self.update(|s| {
            s.state = ConnectionState::Closed;
            s.last_close_code = Some(code);
        });
        let _ = self.events.send(ConnectionEvent::Closed { code });
        info!(code, "socket closed");
        code
    }

    fn handle_frame(&self, text: &str, outbound: &mpsc::Sender<OutboundFrame>) {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed frame");
                return;
            }
        };

        match message.kind {
            MessageKind::Ping => {
                self.heartbeat.beat();
                self.update(|s| s.last_heartbeat = Some(self.heartbeat.last_beat()));
                let pong = OutboundMessage::pong(chrono::Utc::now().timestamp_millis());
                match pong.to_json() {
                    Ok(json) => {
                        if outbound.try_send(OutboundFrame::Text(json)).is_err() {
                            warn!("outbound queue full, pong dropped");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize pong"),
                }
            }
            MessageKind::Pong => debug!("ignoring server pong"),
            kind => {
                debug!(kind = kind.as_str(), "dispatching message");
                self.dispatcher.dispatch(message);
            }
        }
    }

    fn update(&self, f: impl FnOnce(&mut ConnectionStatus)) {
        self.status.send_modify(f);
    }
}
