//! CLI - command line interface for castbridge
//!
//! The bridge normally runs embedded in a home-automation platform; the
//! CLI exposes the same surface for automation scripts and diagnostics.
//! All output is JSON-parseable with `--json`.
//!
//! # Examples
//!
//! ```bash
//! # List the default account's playlists
//! castbridge playlists --limit 20
//!
//! # Play a URI on a known device
//! castbridge play spotify:album:6akEvsycLGftJxYudPjmqK --device-id abc123 --shuffle
//!
//! # Derive the protocol device id of a cast device
//! castbridge device-id "Living Room speaker"
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fmt;

use castbridge::models::RepeatMode;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network or remote API error
    NetworkError = 3,
    /// Credentials rejected or expired
    AuthFailed = 4,
    /// Account or device could not be resolved
    TargetNotFound = 5,
    /// Receiver launch failed
    LaunchFailed = 6,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as i32 as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// castbridge - bridge a music-service account to cast devices
#[derive(Parser, Debug)]
#[command(
    name = "castbridge",
    version,
    about = "Bridge a Spotify account to Chromecast devices",
    after_help = "EXAMPLES:\n\
                  castbridge playlists --limit 20        List playlists\n\
                  castbridge devices                     List connect devices\n\
                  castbridge liked-count                 Count liked songs\n\
                  castbridge play <uri> --device-id <id> Start playback\n\
                  castbridge device-id \"Living Room\"     Derive a device id"
)]
pub struct Cli {
    /// Output format as JSON
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Account entry id (defaults to the default account)
    #[arg(long, short = 'a', global = true)]
    pub account: Option<String>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List playlists of the requested kind
    Playlists(PlaylistsCmd),
    /// List connect devices linked to the account
    Devices(DevicesCmd),
    /// List browse categories
    Categories(CategoriesCmd),
    /// List liked-song URIs
    Liked(LikedCmd),
    /// Count liked songs
    LikedCount(LikedCountCmd),
    /// Start or transfer playback on a device
    Play(PlayCmd),
    /// Derive the protocol device id for a cast device name
    DeviceId(DeviceIdCmd),
    /// List configured accounts
    Accounts(AccountsCmd),
    /// Store a new account entry in the config file
    AccountAdd(AccountAddCmd),
}

#[derive(Args, Debug)]
pub struct PlaylistsCmd {
    /// Listing kind: user, featured, made-for-x, or a named view
    #[arg(long, default_value = "user")]
    pub kind: String,

    /// Country code for featured listings
    #[arg(long)]
    pub country: Option<String>,

    /// Locale for featured listings
    #[arg(long, default_value = "en")]
    pub locale: String,

    /// Maximum number of playlists
    #[arg(long, default_value_t = 10)]
    pub limit: u64,
}

#[derive(Args, Debug)]
pub struct DevicesCmd {}

#[derive(Args, Debug)]
pub struct CategoriesCmd {
    /// Locale for category names
    #[arg(long)]
    pub locale: Option<String>,

    /// Bypass the cache
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct LikedCmd {
    /// Bypass the cache
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct LikedCountCmd {}

#[derive(Args, Debug)]
pub struct PlayCmd {
    /// Target URI; omit to transfer the active session
    pub uri: Option<String>,

    /// Resolve the target from a search instead of a URI
    #[arg(long, conflicts_with = "uri")]
    pub search: Option<String>,

    /// Resolve the target to a random playlist of a browse category
    #[arg(long, conflicts_with_all = ["uri", "search"])]
    pub category: Option<String>,

    /// Service device id to play on
    #[arg(long, short = 'd')]
    pub device_id: String,

    /// Start at a random position inside the context
    #[arg(long)]
    pub random: bool,

    /// Explicit track offset inside the context
    #[arg(long)]
    pub offset: Option<u64>,

    /// Seek position inside the first item, in milliseconds
    #[arg(long)]
    pub position_ms: Option<u64>,

    /// Skip show episodes already played to the end
    #[arg(long)]
    pub ignore_fully_played: bool,

    /// Force playback to resume on transfer
    #[arg(long)]
    pub force_playback: bool,

    /// Starting volume, in percent
    #[arg(long)]
    pub volume: Option<u8>,

    /// Enable shuffle after playback starts
    #[arg(long)]
    pub shuffle: bool,

    /// Repeat mode after playback starts
    #[arg(long, value_enum)]
    pub repeat: Option<RepeatArg>,
}

/// Repeat mode argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RepeatArg {
    Track,
    Context,
    Off,
}

impl From<RepeatArg> for RepeatMode {
    fn from(arg: RepeatArg) -> Self {
        match arg {
            RepeatArg::Track => RepeatMode::Track,
            RepeatArg::Context => RepeatMode::Context,
            RepeatArg::Off => RepeatMode::Off,
        }
    }
}

#[derive(Args, Debug)]
pub struct DeviceIdCmd {
    /// Display name of the cast device
    pub name: String,
}

#[derive(Args, Debug)]
pub struct AccountsCmd {}

#[derive(Args, Debug)]
pub struct AccountAddCmd {
    /// Web-player sp_dc cookie
    #[arg(long)]
    pub sp_dc: String,

    /// Web-player sp_key cookie
    #[arg(long)]
    pub sp_key: String,

    /// OAuth refresh token for the Web API session
    #[arg(long)]
    pub refresh_token: Option<String>,

    /// OAuth client id matching the refresh token
    #[arg(long)]
    pub client_id: Option<String>,
}

// =============================================================================
// Output Helper
// =============================================================================

/// Writes command results as lines or JSON
pub struct Output {
    json: bool,
    quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.json,
            quiet: cli.quiet,
        }
    }

    /// Progress message on stderr, silenced by --quiet
    pub fn info(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }

    /// Error message on stderr, passing the exit code through
    pub fn error(&self, message: impl AsRef<str>, code: ExitCode) -> ExitCode {
        eprintln!("error: {}", message.as_ref());
        code
    }

    /// Print a list of items, one per line (or a JSON array)
    pub fn print_list<T: Serialize + fmt::Display>(&self, items: &[T]) -> ExitCode {
        if self.json {
            match serde_json::to_string_pretty(items) {
                Ok(encoded) => println!("{}", encoded),
                Err(err) => return self.error(format!("failed to serialize: {}", err), ExitCode::Error),
            }
        } else {
            for item in items {
                println!("{}", item);
            }
        }
        ExitCode::Success
    }

    /// Print a single serializable value
    pub fn print_value<T: Serialize>(&self, value: &T) -> ExitCode {
        match serde_json::to_string_pretty(value) {
            Ok(encoded) => {
                println!("{}", encoded);
                ExitCode::Success
            }
            Err(err) => self.error(format!("failed to serialize: {}", err), ExitCode::Error),
        }
    }

    /// Print a plain line regardless of mode
    pub fn print_line(&self, line: impl AsRef<str>) -> ExitCode {
        println!("{}", line.as_ref());
        ExitCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_play_requires_device_id() {
        let result = Cli::try_parse_from(["castbridge", "play", "spotify:track:abc"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_play_parses_full_invocation() {
        let cli = Cli::try_parse_from([
            "castbridge",
            "play",
            "spotify:album:xyz",
            "--device-id",
            "dev1",
            "--random",
            "--volume",
            "40",
            "--repeat",
            "context",
        ])
        .unwrap();

        match cli.command {
            Command::Play(cmd) => {
                assert_eq!(cmd.uri.as_deref(), Some("spotify:album:xyz"));
                assert_eq!(cmd.device_id, "dev1");
                assert!(cmd.random);
                assert_eq!(cmd.volume, Some(40));
                assert_eq!(cmd.repeat, Some(RepeatArg::Context));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
