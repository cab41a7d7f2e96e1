//! Server heartbeat liveness tracking.
//!
//! The server pings; the client answers and records the time. The
//! connection's health check compares the silence since the last ping
//! against the tolerance and force-closes a socket that has gone quiet.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Last-heard timestamp of the server heartbeat.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    tolerance: Duration,
    last_beat: Mutex<Instant>,
}

impl HeartbeatMonitor {
    /// Create a monitor whose clock starts now.
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            last_beat: Mutex::new(Instant::now()),
        }
    }

    /// Record a heartbeat.
    pub fn beat(&self) {
        *self.last_beat.lock() = Instant::now();
    }

    /// Restart the clock for a fresh connection.
    pub fn reset(&self) {
        self.beat();
    }

    /// Timestamp of the last heartbeat (or reset).
    pub fn last_beat(&self) -> Instant {
        *self.last_beat.lock()
    }

    /// Time since the last heartbeat.
    pub fn silence(&self) -> Duration {
        self.last_beat.lock().elapsed()
    }

    /// Whether the silence exceeds the tolerance.
    pub fn is_expired(&self) -> bool {
        self.silence() > self.tolerance
    }

    /// Configured tolerance.
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }
}
