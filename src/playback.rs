//! Playback command sequencing
//!
//! Once a device is ready, a play request resolves to one of three
//! shapes: transfer the active session (no target given), play a single
//! item (track/episode/show), or play a context (album, playlist, artist,
//! liked-songs collection) with an optional random or explicit offset.
//! Follow-up tweaks (volume, shuffle, repeat) run best-effort after a
//! settle delay; the receiver needs a moment to register the new session
//! before it accepts them.

use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::api::{pager, ApiError, SpotifyClient};
use crate::models::{MediaUri, RepeatMode, UriError};

/// Settle delay before the starting-volume call
const VOLUME_SETTLE: Duration = Duration::from_secs(2);

/// Settle delay before the shuffle call
const SHUFFLE_SETTLE: Duration = Duration::from_secs(3);

/// Settle delay before the repeat call
const REPEAT_SETTLE: Duration = Duration::from_secs(3);

/// Playback command error types
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    InvalidUri(#[from] UriError),

    #[error("no playable episode found for `{0}`")]
    NoPlayableEpisode(String),

    #[error("remote playback call failed: {0}")]
    Remote(#[from] ApiError),
}

/// Options for a play request
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    /// Start at a random position inside the context
    pub random: bool,
    /// Explicit track offset inside the context
    pub offset: Option<u64>,
    /// Seek position inside the first item, in milliseconds
    pub position_ms: Option<u64>,
    /// Skip show episodes already played to the end
    pub ignore_fully_played: bool,
    /// Market used when resolving shows and albums
    pub country: Option<String>,
}

/// Best-effort follow-up settings applied after playback starts
#[derive(Debug, Clone, Default)]
pub struct PlayExtras {
    pub volume: Option<u8>,
    pub shuffle: Option<bool>,
    pub repeat: Option<RepeatMode>,
}

impl PlayExtras {
    pub fn is_empty(&self) -> bool {
        self.volume.is_none() && self.shuffle.is_none() && self.repeat.is_none()
    }
}

/// Start playback of `uri` on the given device.
///
/// The URI is validated and normalized before any remote call; a failure
/// from the playback start itself is fatal to the whole command.
pub async fn play(
    client: &SpotifyClient,
    token: &str,
    device_id: &str,
    uri: &str,
    opts: &PlayOptions,
) -> Result<(), PlaybackError> {
    let uri = MediaUri::parse(uri)?;
    info!("playing `{}` on device `{}`", uri, device_id);

    match uri.kind() {
        "show" => play_show(client, token, device_id, &uri, opts).await,
        "track" | "episode" => {
            debug!("playing single item `{}`", uri);
            client
                .start_playback(
                    token,
                    device_id,
                    None,
                    Some(vec![uri.as_str().to_string()]),
                    None,
                    opts.position_ms,
                )
                .await?;
            Ok(())
        }
        _ => play_context(client, token, device_id, &uri, opts).await,
    }
}

/// Play the most relevant episode of a show
async fn play_show(
    client: &SpotifyClient,
    token: &str,
    device_id: &str,
    uri: &MediaUri,
    opts: &PlayOptions,
) -> Result<(), PlaybackError> {
    let response = client
        .show_episodes(token, uri.id(), opts.country.as_deref())
        .await?;
    let episodes = response
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let episode_uri = episodes
        .iter()
        .find(|episode| {
            if !opts.ignore_fully_played {
                return true;
            }
            !episode
                .get("resume_point")
                .and_then(|point| point.get("fully_played"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .and_then(|episode| episode.get("uri"))
        .and_then(Value::as_str)
        .ok_or_else(|| PlaybackError::NoPlayableEpisode(uri.as_str().to_string()))?;

    debug!("playing episode `{}` of show `{}`", episode_uri, uri);
    client
        .start_playback(
            token,
            device_id,
            None,
            Some(vec![episode_uri.to_string()]),
            None,
            opts.position_ms,
        )
        .await?;
    Ok(())
}

/// Play a context URI, resolving the random offset when asked for
async fn play_context(
    client: &SpotifyClient,
    token: &str,
    device_id: &str,
    uri: &MediaUri,
    opts: &PlayOptions,
) -> Result<(), PlaybackError> {
    let mut offset = opts.offset;

    if opts.random {
        let total = context_track_count(client, token, uri, opts.country.as_deref()).await?;
        if let Some(total) = total.filter(|total| *total > 0) {
            let position = rand::rng().random_range(0..total);
            debug!("starting playback at random position {}", position);
            offset = Some(position);
        }
    }

    // Artist contexts reject offsets
    if uri.kind() == "artist" {
        offset = None;
    }

    client
        .start_playback(token, device_id, Some(uri.as_str()), None, offset, opts.position_ms)
        .await?;
    Ok(())
}

/// Reported track total of a context, None for contexts without one
async fn context_track_count(
    client: &SpotifyClient,
    token: &str,
    uri: &MediaUri,
    market: Option<&str>,
) -> Result<Option<u64>, ApiError> {
    if uri.is_collection() {
        let total =
            pager::get_count(|limit, offset| client.saved_tracks(token, limit, offset), None)
                .await?;
        return Ok(Some(total));
    }

    match uri.kind() {
        "album" => {
            let id = uri.id();
            let total = pager::get_count(
                |limit, offset| client.album_tracks(token, id, market, limit, offset),
                None,
            )
            .await?;
            Ok(Some(total))
        }
        "playlist" => {
            let id = uri.id();
            let total = pager::get_count(
                |limit, offset| client.playlist_tracks(token, id, limit, offset),
                None,
            )
            .await?;
            Ok(Some(total))
        }
        _ => Ok(None),
    }
}

/// Transfer the active playback session to the device. Forces playback
/// when something is currently playing, so the session audibly follows.
pub async fn transfer(
    client: &SpotifyClient,
    token: &str,
    device_id: &str,
    force_playback: bool,
) -> Result<(), PlaybackError> {
    let current = client.current_playback(token).await?;
    let play = force_playback || current.is_some();

    info!(
        "transferring playback to device `{}` (play: {})",
        device_id, play
    );
    client.transfer_playback(token, device_id, play).await?;
    Ok(())
}

/// Apply follow-up settings after playback started.
///
/// Each step waits out its settle delay and runs unconditionally; a
/// failing step is logged and the remaining steps still run.
pub async fn apply_extras(
    client: &SpotifyClient,
    token: &str,
    device_id: &str,
    extras: &PlayExtras,
) {
    if let Some(volume) = extras.volume {
        sleep(VOLUME_SETTLE).await;
        debug!("setting starting volume to {}%", volume);
        if let Err(err) = client.set_volume(token, volume, device_id).await {
            warn!("failed to set starting volume: {}", err);
        }
    }

    if let Some(shuffle) = extras.shuffle {
        sleep(SHUFFLE_SETTLE).await;
        debug!("setting shuffle to {}", shuffle);
        if let Err(err) = client.set_shuffle(token, shuffle, device_id).await {
            warn!("failed to set shuffle: {}", err);
        }
    }

    if let Some(repeat) = extras.repeat {
        sleep(REPEAT_SETTLE).await;
        debug!("setting repeat to {}", repeat);
        if let Err(err) = client.set_repeat(token, repeat.as_str(), device_id).await {
            warn!("failed to set repeat: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_play_rejects_invalid_uri_before_any_call() {
        // Unroutable base URL: reaching the network would fail loudly,
        // so an early validation error proves nothing was sent.
        let client = SpotifyClient::with_base_url("http://127.0.0.1:9");

        let result = play(&client, "token", "device", "not-a-uri", &PlayOptions::default()).await;

        assert!(matches!(result, Err(PlaybackError::InvalidUri(_))));
    }

    #[test]
    fn test_extras_is_empty() {
        assert!(PlayExtras::default().is_empty());
        assert!(!PlayExtras {
            volume: Some(30),
            ..PlayExtras::default()
        }
        .is_empty());
    }
}
