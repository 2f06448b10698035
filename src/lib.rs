//! castbridge - bridge a music-service account to cast devices
//!
//! Authenticates against a streaming-music account, caches its catalog
//! data with per-resource TTLs, launches the service's receiver
//! application on cast devices, and issues playback commands once a
//! device is ready.
//!
//! # Modules
//!
//! - `models` - Shared domain models and media URI normalization
//! - `api` - Web API client and pagination walker
//! - `account` - Sessions, cached datasets, and catalog accessors
//! - `cast` - Transport capability and receiver launch state machine
//! - `playback` - Playback command sequencing
//! - `bridge` - Context object owning accounts and launchers
//! - `config` - Persisted account entries

pub mod account;
pub mod api;
pub mod bridge;
pub mod cast;
pub mod config;
pub mod models;
pub mod playback;

// Re-export commonly used types
pub use account::{Account, AccountError, AuthError, SearchQuery, Session, SessionToken};
pub use api::{ApiError, SpotifyClient};
pub use bridge::{Bridge, BridgeError, PlayRequest, TargetError};
pub use cast::{
    cast_device_id, CastMessage, CastTransport, LaunchError, ReceiverLauncher,
};
pub use config::{AccountEntry, Config};
pub use models::{Category, Device, MediaUri, Playlist, PlaylistKind, RepeatMode, UriError};
pub use playback::{PlayExtras, PlayOptions, PlaybackError};
