//! HTTP client for the banter server.
//!
//! Routes (relative to the server origin):
//!
//! | Operation | Request |
//! |---|---|
//! | list-by-owner | `GET /api/owners/{owner}/items[?unplayedOnly=true]` |
//! | play-by-id | `POST /api/items/{id}/play` |
//! | settings-by-owner | `GET /api/owners/{owner}/settings` |

use std::time::Duration;

use async_trait::async_trait;
use banter_core::ApiError;
use banter_core::ids::{ItemId, OwnerId};
use banter_core::DisplayableItem;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::types::{ItemList, OverlayPreferences};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The server's HTTP surface as used by the overlay and dashboard.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait BanterApi: Send + Sync {
    /// Ordered items for an owner.
    async fn list_items(
        &self,
        owner: &OwnerId,
        unplayed_only: bool,
    ) -> Result<Vec<DisplayableItem>, ApiError>;

    /// Mark an item as played (manual playback).
    async fn mark_played(&self, item: &ItemId) -> Result<(), ApiError>;

    /// Owner's overlay preferences.
    async fn overlay_preferences(&self, owner: &OwnerId) -> Result<OverlayPreferences, ApiError>;
}

/// [`BanterApi`] over `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpApi {
    base: Url,
    client: reqwest::Client,
}

impl HttpApi {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("banter/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self::with_client(base_url, client)
    }

    /// Create a client with a shared `reqwest::Client`.
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!("{base_url}: not a base url")));
        }
        Ok(Self { base, client })
    }

    /// Server origin.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::InvalidUrl(self.base.to_string()))?;
            let _ = path.pop_if_empty();
            let _ = path.extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport(&url, &e))?;
        let response = check_status(&url, response)?;
        response.json().await.map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl BanterApi for HttpApi {
    #[instrument(skip_all, fields(owner = %owner, unplayed_only = unplayed_only))]
    async fn list_items(
        &self,
        owner: &OwnerId,
        unplayed_only: bool,
    ) -> Result<Vec<DisplayableItem>, ApiError> {
        let mut url = self.endpoint(&["api", "owners", owner.as_str(), "items"])?;
        if unplayed_only {
            let _ = url.query_pairs_mut().append_pair("unplayedOnly", "true");
        }
        let list: ItemList = self.get_json(url).await?;
        let items = list.into_items();
        debug!(count = items.len(), "fetched item list");
        Ok(items)
    }

    #[instrument(skip_all, fields(item_id = %item))]
    async fn mark_played(&self, item: &ItemId) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "items", item.as_str(), "play"])?;
        let response = self
            .client
            .post(url.clone())
            .send()
            .await
            .map_err(|e| transport(&url, &e))?;
        let _ = check_status(&url, response)?;
        debug!("item marked played");
        Ok(())
    }

    #[instrument(skip_all, fields(owner = %owner))]
    async fn overlay_preferences(&self, owner: &OwnerId) -> Result<OverlayPreferences, ApiError> {
        let url = self.endpoint(&["api", "owners", owner.as_str(), "settings"])?;
        self.get_json(url).await
    }
}

fn transport(url: &Url, error: &reqwest::Error) -> ApiError {
    ApiError::Transport {
        url: url.to_string(),
        message: error.to_string(),
    }
}

fn check_status(url: &Url, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        warn!(%url, status = status.as_u16(), "server returned error status");
        Err(ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
