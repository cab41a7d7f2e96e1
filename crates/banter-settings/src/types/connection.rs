//! Server endpoint and socket lifecycle settings.

use banter_core::retry::BackoffSchedule;
use serde::{Deserialize, Serialize};

/// Where the banter server lives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// HTTP origin of the server. The socket scheme mirrors it
    /// (`http` → `ws`, `https` → `wss`).
    pub base_url: String,
    /// Path of the live socket endpoint.
    pub socket_path: String,
    /// Query parameter carrying the owner ID.
    pub owner_query_param: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            socket_path: "/ws".to_string(),
            owner_query_param: "owner".to_string(),
        }
    }
}

/// Reconnect and heartbeat settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// First reconnect delay after an ordinary close, in ms.
    pub base_delay_ms: u64,
    /// Delay multiplier per consecutive attempt.
    pub growth_factor: f64,
    /// Reconnect delay ceiling after an ordinary close, in ms.
    pub max_delay_ms: u64,
    /// First reconnect delay after an abnormal close (1006), in ms.
    pub abnormal_base_delay_ms: u64,
    /// Reconnect delay ceiling after an abnormal close, in ms.
    pub abnormal_max_delay_ms: u64,
    /// Consecutive reconnect attempts before giving up.
    pub max_attempts: u32,
    /// Period of the local health check, in ms.
    pub health_check_interval_ms: u64,
    /// Silence after which an open socket is declared dead, in ms.
    pub heartbeat_tolerance_ms: u64,
    /// Capacity of the outbound frame queue.
    pub outbound_buffer: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            growth_factor: 1.5,
            max_delay_ms: 10_000,
            abnormal_base_delay_ms: 2000,
            abnormal_max_delay_ms: 15_000,
            max_attempts: 10,
            health_check_interval_ms: 15_000,
            heartbeat_tolerance_ms: 90_000,
            outbound_buffer: 64,
        }
    }
}

impl ConnectionSettings {
    /// Schedule for ordinary closes.
    pub fn standard_schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            base_delay_ms: self.base_delay_ms,
            growth_factor: self.growth_factor,
            max_delay_ms: self.max_delay_ms,
        }
    }

    /// Schedule for abnormal closes and failed connects.
    pub fn abnormal_schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            base_delay_ms: self.abnormal_base_delay_ms,
            growth_factor: self.growth_factor,
            max_delay_ms: self.abnormal_max_delay_ms,
        }
    }
}
