//! Account state: sessions, cached datasets, and catalog accessors
//!
//! - Dataset: TTL cache entry for one remote resource
//! - Token: session guards and refresh capabilities
//! - Search: validated search queries
//!
//! An [`Account`] owns one Web API client, the two sessions, and a fixed
//! set of datasets. Every accessor first makes sure the tokens are valid
//! (which may suspend on a refresh round trip), then serves the dataset
//! from cache or refetches it, then projects the raw payload without
//! mutating it.

pub mod dataset;
pub mod search;
pub mod token;

pub use dataset::Dataset;
pub use search::{QueryError, SearchItemType, SearchQuery};
pub use token::{AuthError, Session, SessionToken};

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::pager::{self, DEFAULT_PAGE_LIMIT};
use crate::api::{ApiError, SpotifyClient};
use crate::models::{Category, Device, Playlist, UserProfile};

/// Base cadence at which cached account data is deemed stale
const REFRESH_RATE: Duration = Duration::from_secs(30);

/// Default delay waiting for a launched device to appear in the list
pub const DEVICE_WAIT_TIMEOUT: Duration = Duration::from_secs(12);

/// Account access error types
#[derive(Error, Debug)]
pub enum AccountError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("device `{device_id}` still not available after {timeout:?}")]
    DeviceNotAvailable {
        device_id: String,
        timeout: Duration,
    },
}

/// The fixed set of cached resources tracked per account
struct Datasets {
    profile: Dataset,
    liked_songs: Dataset,
    playlists: Dataset,
    devices: Dataset,
    categories: Dataset,
}

impl Datasets {
    fn new(rate: Duration) -> Self {
        Self {
            profile: Dataset::new("profile", rate * 10),
            liked_songs: Dataset::new("liked_songs", rate * 4),
            playlists: Dataset::new("playlists", rate * 2),
            devices: Dataset::new("devices", rate),
            categories: Dataset::new("categories", rate * 10),
        }
    }
}

/// A configured music-service account
pub struct Account {
    entry_id: String,
    is_default: bool,
    client: SpotifyClient,
    external: Session,
    internal: Session,
    datasets: Datasets,
}

impl Account {
    /// Build an account from its sessions. `external` backs Web API
    /// calls, `internal` holds the web-player token used for device
    /// authorization during a receiver launch.
    pub fn new(
        entry_id: impl Into<String>,
        is_default: bool,
        client: SpotifyClient,
        external: Session,
        internal: Session,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            is_default,
            client,
            external,
            internal,
            datasets: Datasets::new(REFRESH_RATE),
        }
    }

    /// Override the cache refresh cadence (tests use a zero rate to
    /// force refetches)
    pub fn with_refresh_rate(mut self, rate: Duration) -> Self {
        self.datasets = Datasets::new(rate);
        self
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// The Web API client, for the playback layer
    pub fn client(&self) -> &SpotifyClient {
        &self.client
    }

    /// Raw cached payload of a named dataset, None before its first
    /// fetch or for a name outside the tracked set
    pub fn dataset_data(&self, name: &str) -> Option<Value> {
        match name {
            "profile" => self.datasets.profile.data(),
            "liked_songs" => self.datasets.liked_songs.data(),
            "playlists" => self.datasets.playlists.data(),
            "devices" => self.datasets.devices.data(),
            "categories" => self.datasets.categories.data(),
            _ => None,
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Ensure both session tokens are valid, refreshing as needed
    pub async fn ensure_tokens_valid(&self) -> Result<(), AuthError> {
        self.external.ensure_valid().await?;
        self.internal.ensure_valid().await
    }

    /// Valid Web API bearer token
    pub async fn bearer(&self) -> Result<String, AuthError> {
        self.external.token().await
    }

    /// Valid web-player token with expiry, for the launch handshake
    pub async fn device_token(&self) -> Result<SessionToken, AuthError> {
        self.internal.session_token().await
    }

    /// Token validity plus a warm profile; the profile carries the
    /// country every catalog call wants as a market parameter.
    async fn ensure_ready(&self) -> Result<String, AccountError> {
        let token = self.bearer().await?;
        self.internal.ensure_valid().await?;

        if self.datasets.profile.is_expired() {
            self.profile(false).await?;
        }
        Ok(token)
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Account profile, from cache while fresh
    pub async fn profile(&self, force: bool) -> Result<UserProfile, AccountError> {
        let token = self.bearer().await?;
        let client = &self.client;

        let raw = self
            .datasets
            .profile
            .read(force, || client.me(&token))
            .await?;

        UserProfile::from_value(&raw).ok_or_else(|| {
            AccountError::Api(ApiError::InvalidResponse(
                "profile payload missing required fields".to_string(),
            ))
        })
    }

    /// Profile from the cache only, None before the first fetch
    pub fn cached_profile(&self) -> Option<UserProfile> {
        self.datasets
            .profile
            .data()
            .as_ref()
            .and_then(UserProfile::from_value)
    }

    /// Country the account resides in, once the profile is loaded
    pub fn country(&self) -> Option<String> {
        self.cached_profile().and_then(|profile| profile.country)
    }

    /// URI of the liked-songs pseudo playlist, once the profile is loaded
    pub fn liked_songs_uri(&self) -> Option<String> {
        self.cached_profile()
            .map(|profile| profile.liked_songs_uri())
    }

    // =========================================================================
    // Cached catalog accessors
    // =========================================================================

    /// Connect devices currently linked to the account
    pub async fn devices(&self, force: bool) -> Result<Vec<Device>, AccountError> {
        let token = self.ensure_ready().await?;
        debug!("getting devices for account `{}`", self.entry_id);
        let client = &self.client;

        let raw = self
            .datasets
            .devices
            .read(force, || async {
                let response = client.devices(&token).await?;
                Ok(response
                    .get("devices")
                    .cloned()
                    .unwrap_or_else(|| Value::Array(Vec::new())))
            })
            .await?;

        Ok(project_array(&raw, "device"))
    }

    /// The account's playlists, fully paged
    pub async fn playlists(&self, force: bool) -> Result<Vec<Playlist>, AccountError> {
        let token = self.ensure_ready().await?;
        debug!("getting playlists for account `{}`", self.entry_id);
        let client = &self.client;
        let token = token.as_str();

        let raw = self
            .datasets
            .playlists
            .read(force, || async {
                let items = pager::page_all(
                    |limit, offset| client.current_user_playlists(token, limit, offset),
                    None,
                    DEFAULT_PAGE_LIMIT,
                    None,
                )
                .await?;
                Ok(Value::Array(items))
            })
            .await?;

        Ok(project_array(&raw, "playlist"))
    }

    /// Browse categories available to the account. Country and locale
    /// feed the fetch but not the cache key; switching them takes effect
    /// once the TTL lapses.
    pub async fn categories(
        &self,
        force: bool,
        locale: Option<&str>,
    ) -> Result<Vec<Category>, AccountError> {
        let token = self.ensure_ready().await?;
        debug!("getting browse categories for account `{}`", self.entry_id);
        let client = &self.client;
        let token = token.as_str();
        let country = self.country();
        let country = country.as_deref();

        let raw = self
            .datasets
            .categories
            .read(force, || async {
                let items = pager::page_all(
                    |limit, offset| client.categories(token, country, locale, limit, offset),
                    Some("categories"),
                    DEFAULT_PAGE_LIMIT,
                    None,
                )
                .await?;
                Ok(Value::Array(items))
            })
            .await?;

        Ok(project_array(&raw, "category"))
    }

    /// URIs of the account's liked songs, fully paged
    pub async fn liked_songs(&self, force: bool) -> Result<Vec<String>, AccountError> {
        let token = self.ensure_ready().await?;
        debug!("getting saved tracks for account `{}`", self.entry_id);
        let client = &self.client;
        let token = token.as_str();

        let raw = self
            .datasets
            .liked_songs
            .read(force, || async {
                let items = pager::page_all(
                    |limit, offset| client.saved_tracks(token, limit, offset),
                    None,
                    DEFAULT_PAGE_LIMIT,
                    None,
                )
                .await?;
                Ok(Value::Array(items))
            })
            .await?;

        Ok(project_liked_uris(&raw))
    }

    /// Number of liked songs. Served from the cached dataset while it is
    /// fresh; otherwise a single count-only page fetch, leaving the
    /// cached dataset untouched.
    pub async fn liked_songs_count(&self) -> Result<u64, AccountError> {
        let token = self.ensure_ready().await?;

        if let Some(data) = self.datasets.liked_songs.fresh_data() {
            let count = data.as_array().map(|items| items.len() as u64).unwrap_or(0);
            debug!("liked songs count served from cache: {}", count);
            return Ok(count);
        }

        let client = &self.client;
        let count = pager::get_count(
            |limit, offset| client.saved_tracks(&token, limit, offset),
            None,
        )
        .await?;
        Ok(count)
    }

    // =========================================================================
    // Uncached catalog accessors
    // =========================================================================

    /// Playlists attached to a browse category
    pub async fn category_playlists(
        &self,
        category_id: &str,
    ) -> Result<Vec<Playlist>, AccountError> {
        let token = self.ensure_ready().await?;
        debug!("getting playlists for category `{}`", category_id);
        let client = &self.client;
        let token = token.as_str();
        let country = self.country();
        let country = country.as_deref();

        let items = pager::page_all(
            |limit, offset| {
                client.category_playlists(token, category_id, country, limit, offset)
            },
            Some("playlists"),
            DEFAULT_PAGE_LIMIT,
            None,
        )
        .await?;

        Ok(project_array(&Value::Array(items), "playlist"))
    }

    /// Run a validated search, returning up to `max_items` raw result
    /// objects in relevance order
    pub async fn search(
        &self,
        query: &SearchQuery,
        max_items: u64,
    ) -> Result<Vec<Value>, AccountError> {
        let token = self.ensure_ready().await?;
        debug!("searching `{}` for account `{}`", query, self.entry_id);
        let client = &self.client;
        let token = token.as_str();
        let country = self.country();
        let market = country.as_deref();

        let query_string = query.query_string();
        let item_type = query.item_type();
        let layer = item_type.result_layer();
        let limit = DEFAULT_PAGE_LIMIT.min(max_items);

        let items = pager::page_all(
            |limit, offset| {
                client.search(
                    token,
                    &query_string,
                    item_type.as_str(),
                    market,
                    limit,
                    offset,
                )
            },
            Some(layer.as_str()),
            limit,
            Some(max_items),
        )
        .await?;

        Ok(items)
    }

    // =========================================================================
    // Device availability
    // =========================================================================

    /// Poll the device list until `device_id` shows up. A freshly
    /// launched receiver takes a few seconds to register with the
    /// service, so every poll forces a refetch.
    pub async fn wait_for_device(
        &self,
        device_id: &str,
        timeout: Duration,
    ) -> Result<(), AccountError> {
        debug!("waiting for device `{}` to become available", device_id);
        let deadline = tokio::time::Instant::now() + timeout;
        let poll = timeout / 4;

        loop {
            let devices = self.devices(true).await?;
            if devices
                .iter()
                .any(|device| device.id.as_deref() == Some(device_id))
            {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(AccountError::DeviceNotAvailable {
                    device_id: device_id.to_string(),
                    timeout,
                });
            }

            debug!("device `{}` not yet available", device_id);
            tokio::time::sleep(poll).await;
        }
    }
}

/// Deserialize every element of a cached array payload, skipping (and
/// logging) elements that no longer match the expected shape
fn project_array<T: serde::de::DeserializeOwned>(raw: &Value, kind: &str) -> Vec<T> {
    raw.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match serde_json::from_value(item.clone()) {
                    Ok(parsed) => Some(parsed),
                    Err(err) => {
                        warn!("skipping malformed {} payload: {}", kind, err);
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Project `items[].track.uri` out of the liked-songs payload
fn project_liked_uris(raw: &Value) -> Vec<String> {
    raw.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.get("track")
                        .and_then(|track| track.get("uri"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_liked_uris() {
        let raw = json!([
            {"track": {"uri": "spotify:track:one"}},
            {"track": {"uri": "spotify:track:two"}},
            {"episode": {"uri": "ignored"}}
        ]);
        assert_eq!(
            project_liked_uris(&raw),
            vec!["spotify:track:one", "spotify:track:two"]
        );
    }

    #[test]
    fn test_project_array_skips_malformed() {
        let raw = json!([
            {"id": "a", "name": "ok", "type": "Speaker"},
            {"name_only": true}
        ]);
        let devices: Vec<Device> = project_array(&raw, "device");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "ok");
    }

    #[test]
    fn test_project_liked_uris_empty_payload() {
        assert!(project_liked_uris(&json!(null)).is_empty());
        assert!(project_liked_uris(&json!([])).is_empty());
    }
}
