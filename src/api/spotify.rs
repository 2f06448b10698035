//! Spotify Web API client
//!
//! Thin typed wrapper over the catalog and player endpoints used by the
//! bridge. Tokens rotate per account, so every call takes the bearer token
//! explicitly instead of storing one.
//! API docs: https://developer.spotify.com/documentation/web-api

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default Web API root
const API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Web API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("token rejected by remote API (401)")]
    Unauthorized,

    #[error("remote API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

impl ApiError {
    /// Remote-reported HTTP status, when one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Spotify Web API client
pub struct SpotifyClient {
    base_url: String,
    client: reqwest::Client,
}

impl SpotifyClient {
    /// Create a new client against the public API
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Make an authenticated GET request and deserialize the body
    async fn get<T: DeserializeOwned>(&self, token: &str, endpoint: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("GET {}", endpoint);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                serde_json::from_str(&body)
                    .map_err(|e| ApiError::InvalidResponse(format!("JSON parse error: {}", e)))
            }
            status => Err(Self::error_for(status, response.text().await.ok())),
        }
    }

    /// Issue a player command; the API answers these with an empty 2xx
    async fn command(
        &self,
        method: Method,
        token: &str,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<(), ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {}", method, endpoint);

        let mut request = self.client.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::error_for(status, response.text().await.ok()))
    }

    /// Map a non-success status to an ApiError, reading the remote message
    /// out of the standard `{"error": {"status", "message"}}` envelope
    fn error_for(status: StatusCode, body: Option<String>) -> ApiError {
        if status == StatusCode::UNAUTHORIZED {
            return ApiError::Unauthorized;
        }

        let message = body
            .as_deref()
            .and_then(|text| serde_json::from_str::<Value>(text).ok())
            .and_then(|value| {
                value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }

    // =========================================================================
    // Account and catalog endpoints
    // =========================================================================

    /// Profile of the token's owner
    pub async fn me(&self, token: &str) -> Result<Value, ApiError> {
        self.get(token, "/me").await
    }

    /// Connect devices linked to the account
    pub async fn devices(&self, token: &str) -> Result<Value, ApiError> {
        self.get(token, "/me/player/devices").await
    }

    /// One page of the account's playlists
    pub async fn current_user_playlists(
        &self,
        token: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Value, ApiError> {
        let endpoint = format!("/me/playlists?limit={}&offset={}", limit, offset);
        self.get(token, &endpoint).await
    }

    /// One page of the account's saved tracks (liked songs)
    pub async fn saved_tracks(
        &self,
        token: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Value, ApiError> {
        let endpoint = format!("/me/tracks?limit={}&offset={}", limit, offset);
        self.get(token, &endpoint).await
    }

    /// One page of browse categories
    pub async fn categories(
        &self,
        token: &str,
        country: Option<&str>,
        locale: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<Value, ApiError> {
        let mut endpoint = format!("/browse/categories?limit={}&offset={}", limit, offset);
        if let Some(country) = country {
            endpoint.push_str(&format!("&country={}", urlencoding::encode(country)));
        }
        if let Some(locale) = locale {
            endpoint.push_str(&format!("&locale={}", urlencoding::encode(locale)));
        }
        self.get(token, &endpoint).await
    }

    /// One page of the playlists attached to a browse category
    pub async fn category_playlists(
        &self,
        token: &str,
        category_id: &str,
        country: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<Value, ApiError> {
        let mut endpoint = format!(
            "/browse/categories/{}/playlists?limit={}&offset={}",
            urlencoding::encode(category_id),
            limit,
            offset
        );
        if let Some(country) = country {
            endpoint.push_str(&format!("&country={}", urlencoding::encode(country)));
        }
        self.get(token, &endpoint).await
    }

    /// Editorially featured playlists
    pub async fn featured_playlists(
        &self,
        token: &str,
        locale: Option<&str>,
        country: Option<&str>,
        limit: u64,
    ) -> Result<Value, ApiError> {
        let mut endpoint = format!("/browse/featured-playlists?limit={}&offset=0", limit);
        if let Some(locale) = locale {
            endpoint.push_str(&format!("&locale={}", urlencoding::encode(locale)));
        }
        if let Some(country) = country {
            endpoint.push_str(&format!("&country={}", urlencoding::encode(country)));
        }
        self.get(token, &endpoint).await
    }

    /// A named browse view (made-for-x and friends)
    pub async fn view(
        &self,
        token: &str,
        view_id: &str,
        locale: Option<&str>,
        limit: u64,
    ) -> Result<Value, ApiError> {
        let mut endpoint = format!(
            "/views/{}?content_limit={}&limit={}&offset=0&platform=web&types=album,playlist,artist,show,station",
            urlencoding::encode(view_id),
            limit,
            limit
        );
        if let Some(locale) = locale {
            endpoint.push_str(&format!("&locale={}", urlencoding::encode(locale)));
        }
        self.get(token, &endpoint).await
    }

    /// One page of search results
    pub async fn search(
        &self,
        token: &str,
        query: &str,
        item_type: &str,
        market: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<Value, ApiError> {
        let mut endpoint = format!(
            "/search?q={}&type={}&limit={}&offset={}",
            urlencoding::encode(query),
            item_type,
            limit,
            offset
        );
        if let Some(market) = market {
            endpoint.push_str(&format!("&market={}", urlencoding::encode(market)));
        }
        self.get(token, &endpoint).await
    }

    /// Episodes of a show, newest first per API default ordering
    pub async fn show_episodes(
        &self,
        token: &str,
        show_id: &str,
        market: Option<&str>,
    ) -> Result<Value, ApiError> {
        let mut endpoint = format!("/shows/{}/episodes?limit=50", urlencoding::encode(show_id));
        if let Some(market) = market {
            endpoint.push_str(&format!("&market={}", urlencoding::encode(market)));
        }
        self.get(token, &endpoint).await
    }

    /// One page of an album's tracks
    pub async fn album_tracks(
        &self,
        token: &str,
        album_id: &str,
        market: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<Value, ApiError> {
        let mut endpoint = format!(
            "/albums/{}/tracks?limit={}&offset={}",
            urlencoding::encode(album_id),
            limit,
            offset
        );
        if let Some(market) = market {
            endpoint.push_str(&format!("&market={}", urlencoding::encode(market)));
        }
        self.get(token, &endpoint).await
    }

    /// One page of a playlist's tracks
    pub async fn playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Value, ApiError> {
        let endpoint = format!(
            "/playlists/{}/tracks?limit={}&offset={}",
            urlencoding::encode(playlist_id),
            limit,
            offset
        );
        self.get(token, &endpoint).await
    }

    // =========================================================================
    // Player endpoints
    // =========================================================================

    /// Current playback context, None when nothing is playing (204)
    pub async fn current_playback(&self, token: &str) -> Result<Option<Value>, ApiError> {
        let url = format!("{}/me/player", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::OK => {
                let body = response.text().await?;
                if body.trim().is_empty() {
                    return Ok(None);
                }
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| ApiError::InvalidResponse(format!("JSON parse error: {}", e)))
            }
            status => Err(Self::error_for(status, response.text().await.ok())),
        }
    }

    /// Start playback of a context or an explicit list of URIs
    pub async fn start_playback(
        &self,
        token: &str,
        device_id: &str,
        context_uri: Option<&str>,
        uris: Option<Vec<String>>,
        offset: Option<u64>,
        position_ms: Option<u64>,
    ) -> Result<(), ApiError> {
        let endpoint = format!("/me/player/play?device_id={}", urlencoding::encode(device_id));

        let mut body = json!({});
        if let Some(context_uri) = context_uri {
            body["context_uri"] = json!(context_uri);
        }
        if let Some(uris) = uris {
            body["uris"] = json!(uris);
        }
        if let Some(position) = offset {
            body["offset"] = json!({ "position": position });
        }
        if let Some(position_ms) = position_ms {
            body["position_ms"] = json!(position_ms);
        }

        self.command(Method::PUT, token, &endpoint, Some(body)).await
    }

    /// Transfer the active playback session to another device
    pub async fn transfer_playback(
        &self,
        token: &str,
        device_id: &str,
        play: bool,
    ) -> Result<(), ApiError> {
        let body = json!({ "device_ids": [device_id], "play": play });
        self.command(Method::PUT, token, "/me/player", Some(body)).await
    }

    /// Set the volume of a device, in percent
    pub async fn set_volume(
        &self,
        token: &str,
        volume_percent: u8,
        device_id: &str,
    ) -> Result<(), ApiError> {
        let endpoint = format!(
            "/me/player/volume?volume_percent={}&device_id={}",
            volume_percent,
            urlencoding::encode(device_id)
        );
        self.command(Method::PUT, token, &endpoint, None).await
    }

    /// Toggle shuffle on a device
    pub async fn set_shuffle(
        &self,
        token: &str,
        state: bool,
        device_id: &str,
    ) -> Result<(), ApiError> {
        let endpoint = format!(
            "/me/player/shuffle?state={}&device_id={}",
            state,
            urlencoding::encode(device_id)
        );
        self.command(Method::PUT, token, &endpoint, None).await
    }

    /// Set the repeat mode of a device
    pub async fn set_repeat(
        &self,
        token: &str,
        state: &str,
        device_id: &str,
    ) -> Result<(), ApiError> {
        let endpoint = format!(
            "/me/player/repeat?state={}&device_id={}",
            state,
            urlencoding::encode(device_id)
        );
        self.command(Method::PUT, token, &endpoint, None).await
    }
}

impl Default for SpotifyClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_for_reads_remote_message() {
        let err = SpotifyClient::error_for(
            StatusCode::NOT_FOUND,
            Some(r#"{"error": {"status": 404, "message": "Device not found"}}"#.to_string()),
        );
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Device not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_for_falls_back_to_reason() {
        let err = SpotifyClient::error_for(StatusCode::BAD_GATEWAY, None);
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_for_unauthorized() {
        let err = SpotifyClient::error_for(StatusCode::UNAUTHORIZED, None);
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(err.status(), Some(401));
    }
}
