//! Backoff schedule and delay calculation.
//!
//! Sync-only building blocks; the reconnect loop that sleeps on these delays
//! lives in `banter-socket`.
//!
//! - [`BackoffSchedule`]: base delay, growth factor and ceiling
//! - [`calculate_backoff_delay`]: `min(base * growth^attempt, ceiling)`
//!
//! No jitter is applied: consecutive delays on one schedule must be
//! non-decreasing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default growth factor between consecutive attempts.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.5;
/// Default delay ceiling in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// One exponential backoff schedule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffSchedule {
    /// Delay before the first retry in ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied per attempt (>= 1).
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
    /// Upper bound for any delay in ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_growth_factor() -> f64 {
    DEFAULT_GROWTH_FACTOR
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl BackoffSchedule {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.base_delay_ms,
            self.growth_factor,
            self.max_delay_ms,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate an exponential backoff delay.
///
/// Formula: `min(max_delay, base_delay * growth^attempt)`.
///
/// A growth factor below 1 is treated as 1 so the sequence never shrinks.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    growth_factor: f64,
    max_delay_ms: u64,
) -> u64 {
    let growth = if growth_factor.is_finite() {
        growth_factor.max(1.0)
    } else {
        1.0
    };
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let raw = (base_delay_ms as f64) * growth.powi(exponent);

    if !raw.is_finite() || raw >= max_delay_ms as f64 {
        return max_delay_ms;
    }
    (raw.round() as u64).min(max_delay_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
