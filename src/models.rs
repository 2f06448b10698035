//! Data structures and types for castbridge
//!
//! Contains all shared models used across the crate organized by domain:
//! - **Media URIs**: normalization and validation of playback targets
//! - **Account**: user profile as reported by the music service
//! - **Catalog**: playlists, browse categories, connect devices
//! - **Playback**: repeat modes and playlist listing kinds

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Media URIs
// =============================================================================

/// Error raised for a malformed playback target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    #[error("invalid media URI `{0}`: expected `service:kind:id`")]
    Malformed(String),
}

/// A normalized media URI (`spotify:track:abc123` and friends)
///
/// Normalization strips any trailing query component and lower-cases the
/// service and kind segments while preserving the case of the identifier,
/// which is case-sensitive on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaUri(String);

impl MediaUri {
    /// Parse and normalize a raw URI string
    pub fn parse(raw: &str) -> Result<Self, UriError> {
        // Badly formatted URIs pasted from share links carry a ?si=... suffix
        let stripped = raw.split('?').next().unwrap_or_default();

        let segments: Vec<&str> = stripped.split(':').collect();
        if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(UriError::Malformed(raw.to_string()));
        }

        let mut segments: Vec<String> = segments.into_iter().map(str::to_string).collect();
        segments[0] = segments[0].to_lowercase();
        segments[1] = segments[1].to_lowercase();

        Ok(Self(segments.join(":")))
    }

    /// The full normalized URI
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The kind segment (`track`, `album`, `playlist`, ...)
    pub fn kind(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// The identifier segment (last segment, case preserved)
    pub fn id(&self) -> &str {
        self.0.split(':').next_back().unwrap_or_default()
    }

    /// True for the liked-songs pseudo playlist (`spotify:user:<id>:collection`)
    pub fn is_collection(&self) -> bool {
        self.0.ends_with(":collection")
    }
}

impl fmt::Display for MediaUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Account Models
// =============================================================================

/// Profile image as reported by the `me` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileImage {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// User profile for an authenticated account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub images: Vec<ProfileImage>,
}

impl UserProfile {
    /// Parse a profile from the raw cached payload
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Display name, falling back to the account id
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    /// URL of the largest profile image by area
    pub fn largest_image(&self) -> Option<&str> {
        self.images
            .iter()
            .max_by_key(|image| u64::from(image.width) * u64::from(image.height))
            .map(|image| image.url.as_str())
    }

    /// URI of the account's liked-songs pseudo playlist
    pub fn liked_songs_uri(&self) -> String {
        format!("spotify:user:{}:collection", self.id)
    }
}

impl fmt::Display for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.product {
            Some(product) => write!(f, "{} [{}]", self.name(), product),
            None => write!(f, "{}", self.name()),
        }
    }
}

// =============================================================================
// Catalog Models
// =============================================================================

/// A connect device linked to the account
///
/// The remote API reports a null id for restricted devices, hence the Option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub volume_percent: Option<u8>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_active {
            write!(f, "{} ({}) [active]", self.name, self.kind)
        } else {
            write!(f, "{} ({})", self.name, self.kind)
        }
    }
}

/// Track counter nested in playlist payloads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackCount {
    #[serde(default)]
    pub total: u64,
}

/// A playlist owned by or followed by the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tracks: Option<TrackCount>,
}

impl Playlist {
    /// Number of tracks, when the payload carries it
    pub fn track_count(&self) -> u64 {
        self.tracks.as_ref().map(|t| t.total).unwrap_or(0)
    }
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} tracks)", self.name, self.track_count())
    }
}

/// A browse category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// =============================================================================
// Playback Models
// =============================================================================

/// Repeat mode accepted by the player endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Track,
    Context,
    Off,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Track => "track",
            RepeatMode::Context => "context",
            RepeatMode::Off => "off",
        }
    }

    /// Parse a repeat mode from a service-call string
    pub fn parse_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "track" => Some(RepeatMode::Track),
            "context" | "on" => Some(RepeatMode::Context),
            "off" => Some(RepeatMode::Off),
            _ => None,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of playlist listing requested through the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistKind {
    /// The account's own playlists
    User,
    /// Editorially featured playlists
    Featured,
    /// Personalized "made for you" view
    MadeForX,
    /// Any other named browse view, passed through verbatim
    View(String),
}

impl PlaylistKind {
    /// Parse a listing kind from a service-call string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "" | "user" | "default" => PlaylistKind::User,
            "featured" => PlaylistKind::Featured,
            // historical alias kept for old automations
            "discover-weekly" | "made-for-x" => PlaylistKind::MadeForX,
            other => PlaylistKind::View(other.to_string()),
        }
    }
}

impl fmt::Display for PlaylistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaylistKind::User => write!(f, "user"),
            PlaylistKind::Featured => write!(f, "featured"),
            PlaylistKind::MadeForX => write!(f, "made-for-x"),
            PlaylistKind::View(view) => write!(f, "{}", view),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -------------------------------------------------------------------------
    // MediaUri Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_uri_strips_query_and_lowercases_prefix() {
        let uri = MediaUri::parse("Spotify:Track:AbC123?foo=bar").unwrap();
        assert_eq!(uri.as_str(), "spotify:track:AbC123");
        assert_eq!(uri.kind(), "track");
        assert_eq!(uri.id(), "AbC123");
    }

    #[test]
    fn test_uri_preserves_identifier_case() {
        let uri = MediaUri::parse("SPOTIFY:ALBUM:6akEvsycLGftJxYudPjmqK").unwrap();
        assert_eq!(uri.as_str(), "spotify:album:6akEvsycLGftJxYudPjmqK");
    }

    #[test]
    fn test_uri_rejects_malformed() {
        assert_eq!(
            MediaUri::parse("not-a-uri"),
            Err(UriError::Malformed("not-a-uri".to_string()))
        );
        assert!(MediaUri::parse("spotify:track").is_err());
        assert!(MediaUri::parse("spotify::abc").is_err());
        assert!(MediaUri::parse("").is_err());
    }

    #[test]
    fn test_uri_collection() {
        let uri = MediaUri::parse("spotify:user:1234:collection").unwrap();
        assert!(uri.is_collection());
        assert_eq!(uri.kind(), "user");

        let track = MediaUri::parse("spotify:track:abc").unwrap();
        assert!(!track.is_collection());
    }

    // -------------------------------------------------------------------------
    // UserProfile Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_profile_name_falls_back_to_id() {
        let profile: UserProfile = serde_json::from_value(json!({"id": "user1"})).unwrap();
        assert_eq!(profile.name(), "user1");

        let named: UserProfile =
            serde_json::from_value(json!({"id": "user1", "display_name": "Alice"})).unwrap();
        assert_eq!(named.name(), "Alice");
    }

    #[test]
    fn test_profile_largest_image() {
        let profile: UserProfile = serde_json::from_value(json!({
            "id": "user1",
            "images": [
                {"url": "small", "width": 64, "height": 64},
                {"url": "large", "width": 640, "height": 640},
                {"url": "medium", "width": 300, "height": 300}
            ]
        }))
        .unwrap();
        assert_eq!(profile.largest_image(), Some("large"));
    }

    #[test]
    fn test_profile_liked_songs_uri() {
        let profile: UserProfile = serde_json::from_value(json!({"id": "user1"})).unwrap();
        assert_eq!(profile.liked_songs_uri(), "spotify:user:user1:collection");
    }

    // -------------------------------------------------------------------------
    // Device Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_device_deserializes_api_payload() {
        let device: Device = serde_json::from_value(json!({
            "id": "abc123",
            "name": "Living Room",
            "type": "CastAudio",
            "is_active": true,
            "volume_percent": 45
        }))
        .unwrap();

        assert_eq!(device.id.as_deref(), Some("abc123"));
        assert_eq!(device.kind, "CastAudio");
        assert_eq!(device.to_string(), "Living Room (CastAudio) [active]");
    }

    #[test]
    fn test_device_allows_null_id() {
        let device: Device = serde_json::from_value(json!({
            "id": null,
            "name": "Restricted",
            "type": "Speaker"
        }))
        .unwrap();
        assert!(device.id.is_none());
        assert!(!device.is_active);
    }

    // -------------------------------------------------------------------------
    // Playlist Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_playlist_track_count() {
        let playlist: Playlist = serde_json::from_value(json!({
            "id": "pl1",
            "name": "Morning",
            "uri": "spotify:playlist:pl1",
            "tracks": {"total": 42}
        }))
        .unwrap();
        assert_eq!(playlist.track_count(), 42);
        assert_eq!(playlist.to_string(), "Morning (42 tracks)");
    }

    // -------------------------------------------------------------------------
    // RepeatMode Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_repeat_mode_parse_loose() {
        assert_eq!(RepeatMode::parse_loose("track"), Some(RepeatMode::Track));
        assert_eq!(RepeatMode::parse_loose("Context"), Some(RepeatMode::Context));
        assert_eq!(RepeatMode::parse_loose("on"), Some(RepeatMode::Context));
        assert_eq!(RepeatMode::parse_loose("off"), Some(RepeatMode::Off));
        assert_eq!(RepeatMode::parse_loose("sometimes"), None);
    }

    #[test]
    fn test_repeat_mode_serde() {
        assert_eq!(
            serde_json::to_string(&RepeatMode::Context).unwrap(),
            "\"context\""
        );
    }

    // -------------------------------------------------------------------------
    // PlaylistKind Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_playlist_kind_parse() {
        assert_eq!(PlaylistKind::parse(""), PlaylistKind::User);
        assert_eq!(PlaylistKind::parse("default"), PlaylistKind::User);
        assert_eq!(PlaylistKind::parse("featured"), PlaylistKind::Featured);
        assert_eq!(PlaylistKind::parse("discover-weekly"), PlaylistKind::MadeForX);
        assert_eq!(
            PlaylistKind::parse("toplists"),
            PlaylistKind::View("toplists".to_string())
        );
    }
}
