//! Reconnect decisions after a socket close.
//!
//! A normal close (1000) never reconnects. An abnormal close (1006, which
//! also covers connects that fail before a handshake) follows the abnormal
//! schedule; every other code follows the standard schedule. Once the
//! consecutive attempt count reaches `max_attempts` the manager gives up.

use std::time::Duration;

use banter_core::close::{CloseClass, classify};
use banter_core::retry::BackoffSchedule;
use banter_settings::ConnectionSettings;

/// What to do after the socket closed with a given code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Deliberate close, stay closed.
    Stop,
    /// Schedule another connect after `delay`.
    Retry {
        /// Wait before the next connect.
        delay: Duration,
    },
    /// Attempt limit reached.
    GiveUp {
        /// Consecutive attempts made.
        attempts: u32,
    },
}

/// Backoff schedules plus the attempt ceiling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// Schedule for ordinary closes.
    pub standard: BackoffSchedule,
    /// Schedule for abnormal closes.
    pub abnormal: BackoffSchedule,
    /// Consecutive attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_settings(&ConnectionSettings::default())
    }
}

impl ReconnectPolicy {
    /// Build from connection settings.
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            standard: settings.standard_schedule(),
            abnormal: settings.abnormal_schedule(),
            max_attempts: settings.max_attempts,
        }
    }

    /// Decide for a close `code` given the attempts already made since the
    /// last successful open.
    pub fn decide(&self, code: u16, attempts: u32) -> ReconnectDecision {
        let schedule = match classify(code) {
            CloseClass::Normal => return ReconnectDecision::Stop,
            CloseClass::Abnormal => &self.abnormal,
            CloseClass::Other => &self.standard,
        };
        if attempts >= self.max_attempts {
            return ReconnectDecision::GiveUp { attempts };
        }
        ReconnectDecision::Retry {
            delay: schedule.delay_for(attempts),
        }
    }
}
