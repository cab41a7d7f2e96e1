//! Connection configuration and socket URL derivation.

use std::time::Duration;

use banter_core::ConnectionError;
use banter_core::ids::OwnerId;
use banter_settings::{ConnectionSettings, ServerSettings};
use url::Url;

use crate::reconnect::ReconnectPolicy;

/// Everything a [`ConnectionManager`](crate::ConnectionManager) needs.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Socket URL, owner query included.
    pub url: Url,
    /// Backoff and give-up rules.
    pub policy: ReconnectPolicy,
    /// Period of the health check while open.
    pub health_check_interval: Duration,
    /// Silence after which an open socket is force-closed.
    pub heartbeat_tolerance: Duration,
    /// Capacity of the outbound frame queue.
    pub outbound_buffer: usize,
}

impl ConnectionConfig {
    /// Build the configuration for one owner from settings.
    pub fn for_owner(
        server: &ServerSettings,
        connection: &ConnectionSettings,
        owner: &OwnerId,
    ) -> Result<Self, ConnectionError> {
        let url = socket_url(
            &server.base_url,
            &server.socket_path,
            &server.owner_query_param,
            owner,
        )?;
        Ok(Self::with_url(url, connection))
    }

    /// Build the configuration for an explicit URL.
    pub fn with_url(url: Url, connection: &ConnectionSettings) -> Self {
        Self {
            url,
            policy: ReconnectPolicy::from_settings(connection),
            health_check_interval: Duration::from_millis(connection.health_check_interval_ms),
            heartbeat_tolerance: Duration::from_millis(connection.heartbeat_tolerance_ms),
            outbound_buffer: connection.outbound_buffer.max(1),
        }
    }
}

/// Derive the socket URL from the HTTP origin.
///
/// The scheme mirrors the origin (`http` → `ws`, `https` → `wss`); `ws` and
/// `wss` origins are used as-is. Any query on the base is replaced by the
/// owner parameter.
pub fn socket_url(
    base_url: &str,
    path: &str,
    owner_param: &str,
    owner: &OwnerId,
) -> Result<Url, ConnectionError> {
    let invalid = |reason: String| ConnectionError::InvalidUrl {
        url: base_url.to_owned(),
        reason,
    };

    if owner.is_empty() {
        return Err(invalid("owner id is empty".into()));
    }

    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch scheme to {scheme}")))?;
    url.set_path(path);
    url.set_fragment(None);
    let _ = url
        .query_pairs_mut()
        .clear()
        .append_pair(owner_param, owner.as_str());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn owner() -> OwnerId {
        OwnerId::from("streamer 1")
    }

    #[test]
    fn http_becomes_ws() {
        let url = socket_url("http://localhost:3000", "/ws", "owner", &owner()).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3000/ws?owner=streamer+1");
    }

    #[test]
    fn https_becomes_wss() {
        let url = socket_url("https://banter.example/app", "/ws", "userId", &owner()).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/ws");
        assert_eq!(url.query(), Some("userId=streamer+1"));
    }

    #[test]
    fn existing_query_is_replaced() {
        let url = socket_url("http://h/?x=1#frag", "/live", "owner", &owner()).unwrap();
        assert_eq!(url.as_str(), "ws://h/live?owner=streamer+1");
    }

    #[test]
    fn ws_origin_kept() {
        let url = socket_url("wss://h", "/ws", "owner", &owner()).unwrap();
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn unsupported_scheme_rejected() {
        let err = socket_url("ftp://h", "/ws", "owner", &owner()).unwrap_err();
        assert_matches!(err, ConnectionError::InvalidUrl { reason, .. } if reason.contains("ftp"));
    }

    #[test]
    fn garbage_rejected() {
        assert!(socket_url("not a url", "/ws", "owner", &owner()).is_err());
    }

    #[test]
    fn empty_owner_rejected() {
        assert!(socket_url("http://h", "/ws", "owner", &OwnerId::default()).is_err());
    }

    #[test]
    fn config_from_settings() {
        let cfg = ConnectionConfig::for_owner(
            &ServerSettings::default(),
            &ConnectionSettings::default(),
            &OwnerId::from("o1"),
        )
        .unwrap();
        assert_eq!(cfg.url.as_str(), "ws://127.0.0.1:3000/ws?owner=o1");
        assert_eq!(cfg.health_check_interval, Duration::from_secs(15));
        assert_eq!(cfg.heartbeat_tolerance, Duration::from_secs(90));
        assert_eq!(cfg.policy.max_attempts, 10);
    }
}
