//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs the keys it overrides.

mod connection;
mod presentation;

pub use connection::*;
pub use presentation::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// Loaded from `~/.banter/settings.json` with defaults applied for missing
/// fields. Example:
///
/// ```json
/// {
///   "server": { "baseUrl": "https://banter.example" },
///   "overlay": { "displayDurationMs": 8000 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BanterSettings {
    /// Server endpoint.
    pub server: ServerSettings,
    /// Socket reconnect and heartbeat tuning.
    pub connection: ConnectionSettings,
    /// Overlay presentation.
    pub overlay: OverlaySettings,
    /// Dashboard queue.
    pub dashboard: DashboardSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

impl BanterSettings {
    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if !c.growth_factor.is_finite() || c.growth_factor < 1.0 {
            return Err(invalid(format!(
                "connection.growthFactor must be >= 1, got {}",
                c.growth_factor
            )));
        }
        if c.base_delay_ms == 0 || c.abnormal_base_delay_ms == 0 {
            return Err(invalid("reconnect base delays must be non-zero"));
        }
        if c.max_delay_ms < c.base_delay_ms || c.abnormal_max_delay_ms < c.abnormal_base_delay_ms
        {
            return Err(invalid("reconnect ceilings must not be below their base delays"));
        }
        if c.max_attempts == 0 {
            return Err(invalid("connection.maxAttempts must be >= 1"));
        }
        if c.health_check_interval_ms == 0 || c.heartbeat_tolerance_ms == 0 {
            return Err(invalid("heartbeat periods must be non-zero"));
        }
        if c.outbound_buffer == 0 {
            return Err(invalid("connection.outboundBuffer must be >= 1"));
        }
        if self.overlay.volume > 100 {
            return Err(invalid(format!(
                "overlay.volume must be 0-100, got {}",
                self.overlay.volume
            )));
        }
        if self.overlay.display_duration_ms == 0 {
            return Err(invalid("overlay.displayDurationMs must be non-zero"));
        }
        if self.dashboard.poll_interval_ms == 0 {
            return Err(invalid("dashboard.pollIntervalMs must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue(message.into())
}

/// Logging output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level or filter directive.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
