//! WebSocket close codes and their reconnect classification.

/// Clean shutdown requested by either side. Never triggers a reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Endpoint going away (server restart, page navigation).
pub const GOING_AWAY: u16 = 1001;
/// Close frame without a status code.
pub const NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame. Also used locally for failed
/// connection attempts.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Local close after the heartbeat tolerance window elapsed.
pub const HEARTBEAT_TIMEOUT: u16 = 4000;

/// How a close code affects reconnection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseClass {
    /// Normal closure: stay closed.
    Normal,
    /// Abnormal closure: reconnect on the patient schedule.
    Abnormal,
    /// Anything else: reconnect on the standard schedule.
    Other,
}

/// Classify a close code.
pub fn classify(code: u16) -> CloseClass {
    match code {
        NORMAL_CLOSURE => CloseClass::Normal,
        ABNORMAL_CLOSURE => CloseClass::Abnormal,
        _ => CloseClass::Other,
    }
}
