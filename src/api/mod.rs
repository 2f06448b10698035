//! Remote music-service API
//!
//! - Spotify: Web API client for catalog and player endpoints
//! - Pager: offset-based pagination walker shared by all listing calls

pub mod pager;
pub mod spotify;

pub use spotify::{ApiError, SpotifyClient};
