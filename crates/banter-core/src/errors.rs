//! Error hierarchy for the banter client.
//!
//! - [`BanterError`]: top-level enum covering all error domains
//! - [`ConnectionError`]: socket construction and lifecycle failures
//! - [`AudioError`]: media load/playback failures with an [`AudioFailureKind`]
//! - [`ApiError`]: HTTP collaborator failures
//!
//! Every variant is classified by [`ErrorCategory`] so callers can decide
//! whether to retry or surface a passive status.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// Broad error category used for retry and reporting decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connectivity problem (refused, reset, timeout).
    Network,
    /// Peer sent something we could not understand.
    Protocol,
    /// Media resource could not be loaded or played.
    Media,
    /// Server answered with an error status.
    Server,
    /// Invalid local configuration.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::Media => "media",
            Self::Server => "server",
            Self::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BanterError
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type.
#[derive(Debug, Error)]
pub enum BanterError {
    /// Socket error.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Audio error.
    #[error(transparent)]
    Audio(#[from] AudioError),
    /// HTTP collaborator error.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl BanterError {
    /// Error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection(e) => e.category(),
            Self::Audio(_) => ErrorCategory::Media,
            Self::Api(e) => e.category(),
        }
    }

    /// Whether retrying the operation can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::Media
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionError
// ─────────────────────────────────────────────────────────────────────────────

/// Socket lifecycle error.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The socket URL could not be derived.
    #[error("invalid socket url {url}: {reason}")]
    InvalidUrl {
        /// Offending URL or base.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The handshake or TCP connect failed.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Target URL.
        url: String,
        /// Transport message.
        message: String,
    },
    /// Reconnection gave up after the configured number of attempts.
    #[error("gave up reconnecting after {attempts} attempts")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

impl ConnectionError {
    /// Error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidUrl { .. } => ErrorCategory::Configuration,
            Self::Connect { .. } | Self::Exhausted { .. } => ErrorCategory::Network,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AudioError
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a recoverable media failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioFailureKind {
    /// The resource could not be resolved, fetched or decoded.
    AudioLoadFailure,
    /// The resource loaded but playback failed.
    PlaybackFailure,
}

impl fmt::Display for AudioFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AudioLoadFailure => f.write_str("AudioLoadFailure"),
            Self::PlaybackFailure => f.write_str("PlaybackFailure"),
        }
    }
}

/// Media failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AudioError {
    /// The URL could not be turned into a loadable resource.
    #[error("invalid audio source {location}: {reason}")]
    InvalidSource {
        /// The URL as given.
        location: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Fetching or decoding failed.
    #[error("failed to load audio {location}: {reason}")]
    Load {
        /// Resolved location.
        location: String,
        /// Backend message.
        reason: String,
    },
    /// Playback failed after loading.
    #[error("audio playback failed: {reason}")]
    Playback {
        /// Backend message.
        reason: String,
    },
}

impl AudioError {
    /// Failure kind reported to observers.
    pub fn kind(&self) -> AudioFailureKind {
        match self {
            Self::InvalidSource { .. } | Self::Load { .. } => AudioFailureKind::AudioLoadFailure,
            Self::Playback { .. } => AudioFailureKind::PlaybackFailure,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiError
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP collaborator error.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request URL could not be built.
    #[error("invalid api url: {0}")]
    InvalidUrl(String),
    /// Request never produced a response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Request URL.
        url: String,
        /// Transport message.
        message: String,
    },
    /// Server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// Response body did not match the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decoder message.
        message: String,
    },
}

impl ApiError {
    /// Error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidUrl(_) => ErrorCategory::Configuration,
            Self::Transport { .. } => ErrorCategory::Network,
            Self::Status { status, .. } if *status >= 500 => ErrorCategory::Server,
            Self::Status { .. } | Self::Decode { .. } => ErrorCategory::Protocol,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn connection_error_display() {
        let err = ConnectionError::Connect {
            url: "ws://localhost/ws".into(),
            message: "refused".into(),
        };
        assert_eq!(err.to_string(), "failed to connect to ws://localhost/ws: refused");
        assert_eq!(err.category(), ErrorCategory::Network);
    }

    #[test]
    fn invalid_url_is_configuration() {
        let err = BanterError::from(ConnectionError::InvalidUrl {
            url: "ftp://x".into(),
            reason: "unsupported scheme".into(),
        });
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!err.is_retryable());
    }

    #[test]
    fn audio_error_kinds() {
        let load = AudioError::Load {
            location: "http://x/a.mp3".into(),
            reason: "404".into(),
        };
        assert_eq!(load.kind(), AudioFailureKind::AudioLoadFailure);
        let bad = AudioError::InvalidSource {
            location: "::".into(),
            reason: "bad".into(),
        };
        assert_eq!(bad.kind(), AudioFailureKind::AudioLoadFailure);
        let play = AudioError::Playback {
            reason: "device lost".into(),
        };
        assert_eq!(play.kind(), AudioFailureKind::PlaybackFailure);
        assert_eq!(play.kind().to_string(), "PlaybackFailure");
    }

    #[test]
    fn audio_errors_are_retryable() {
        let err = BanterError::from(AudioError::Playback { reason: "x".into() });
        assert_eq!(err.category(), ErrorCategory::Media);
        assert!(err.is_retryable());
    }

    #[test]
    fn api_status_classification() {
        let server = ApiError::Status {
            url: "u".into(),
            status: 503,
        };
        assert_eq!(server.category(), ErrorCategory::Server);
        let client = ApiError::Status {
            url: "u".into(),
            status: 404,
        };
        assert_eq!(client.category(), ErrorCategory::Protocol);
        assert_matches!(BanterError::from(client), BanterError::Api(ApiError::Status { status: 404, .. }));
    }

    #[test]
    fn failure_kind_serializes_camel_case() {
        let json = serde_json::to_string(&AudioFailureKind::AudioLoadFailure).unwrap();
        assert_eq!(json, "\"audioLoadFailure\"");
    }

    #[test]
    fn category_display() {
        assert_eq!(ErrorCategory::Network.to_string(), "network");
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
    }
}
