//! CLI command handlers
//!
//! Each handler loads the persisted configuration, builds the bridge,
//! performs one bridge call, and maps failures to semantic exit codes.

use castbridge::account::AccountError;
use castbridge::bridge::{Bridge, BridgeError, PlayRequest};
use castbridge::cast::cast_device_id;
use castbridge::config::{AccountEntry, Config};
use castbridge::models::PlaylistKind;
use castbridge::playback::{PlayExtras, PlayOptions};

use crate::cli::{
    AccountAddCmd, AccountsCmd, CategoriesCmd, DeviceIdCmd, DevicesCmd, ExitCode, LikedCmd,
    LikedCountCmd, Output, PlayCmd, PlaylistsCmd,
};

/// Map a bridge failure to its semantic exit code
fn exit_code_for(err: &BridgeError) -> ExitCode {
    match err {
        BridgeError::Target(_) => ExitCode::TargetNotFound,
        BridgeError::Auth(_) => ExitCode::AuthFailed,
        BridgeError::Account(AccountError::Auth(_)) => ExitCode::AuthFailed,
        BridgeError::Account(_) => ExitCode::NetworkError,
        BridgeError::Api(_) => ExitCode::NetworkError,
        BridgeError::Launch(_) => ExitCode::LaunchFailed,
        BridgeError::Playback(_) => ExitCode::NetworkError,
        BridgeError::Query(_) => ExitCode::InvalidArgs,
        BridgeError::DuplicateDefault(_, _) => ExitCode::InvalidArgs,
    }
}

fn build_bridge(output: &Output) -> Result<Bridge, ExitCode> {
    let config = Config::load();
    if config.accounts.is_empty() {
        return Err(output.error(
            "no accounts configured, run `castbridge account-add` first",
            ExitCode::InvalidArgs,
        ));
    }
    Bridge::from_config(&config).map_err(|err| output.error(err.to_string(), exit_code_for(&err)))
}

// =============================================================================
// Catalog Commands
// =============================================================================

pub async fn playlists_cmd(cmd: PlaylistsCmd, account: Option<&str>, output: &Output) -> ExitCode {
    let bridge = match build_bridge(output) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    output.info(format!("Fetching {} playlists...", cmd.kind));

    match bridge
        .get_playlists(
            account,
            PlaylistKind::parse(&cmd.kind),
            cmd.country.as_deref(),
            Some(cmd.locale.as_str()),
            cmd.limit,
        )
        .await
    {
        Ok(listing) => output.print_value(&listing),
        Err(err) => output.error(err.to_string(), exit_code_for(&err)),
    }
}

pub async fn devices_cmd(_cmd: DevicesCmd, account: Option<&str>, output: &Output) -> ExitCode {
    let bridge = match build_bridge(output) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    output.info("Fetching devices...");

    match bridge.get_devices(account).await {
        Ok(devices) => output.print_list(&devices),
        Err(err) => output.error(err.to_string(), exit_code_for(&err)),
    }
}

pub async fn categories_cmd(cmd: CategoriesCmd, account: Option<&str>, output: &Output) -> ExitCode {
    let bridge = match build_bridge(output) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    output.info("Fetching browse categories...");

    match bridge
        .get_categories(account, cmd.locale.as_deref(), cmd.force)
        .await
    {
        Ok(categories) => output.print_list(&categories),
        Err(err) => output.error(err.to_string(), exit_code_for(&err)),
    }
}

pub async fn liked_cmd(cmd: LikedCmd, account: Option<&str>, output: &Output) -> ExitCode {
    let bridge = match build_bridge(output) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    output.info("Fetching liked songs...");

    match bridge.liked_songs(account, cmd.force).await {
        Ok(uris) => output.print_list(&uris),
        Err(err) => output.error(err.to_string(), exit_code_for(&err)),
    }
}

pub async fn liked_count_cmd(
    _cmd: LikedCountCmd,
    account: Option<&str>,
    output: &Output,
) -> ExitCode {
    let bridge = match build_bridge(output) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    match bridge.liked_songs_count(account).await {
        Ok(count) => output.print_line(count.to_string()),
        Err(err) => output.error(err.to_string(), exit_code_for(&err)),
    }
}

// =============================================================================
// Playback Command
// =============================================================================

pub async fn play_cmd(cmd: PlayCmd, account: Option<&str>, output: &Output) -> ExitCode {
    let bridge = match build_bridge(output) {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    let request = PlayRequest {
        uri: cmd.uri,
        search: cmd.search,
        category: cmd.category,
        device_id: Some(cmd.device_id),
        force_playback: cmd.force_playback,
        options: PlayOptions {
            random: cmd.random,
            offset: cmd.offset,
            position_ms: cmd.position_ms,
            ignore_fully_played: cmd.ignore_fully_played,
            country: None,
        },
        extras: PlayExtras {
            volume: cmd.volume,
            shuffle: cmd.shuffle.then_some(true),
            repeat: cmd.repeat.map(Into::into),
        },
        launch_timeout: None,
    };

    output.info("Sending playback command...");

    // The CLI has no cast transport; the device id names an already
    // registered device.
    match bridge.play_media(account, None, request).await {
        Ok(()) => {
            output.info("Playback command sent");
            ExitCode::Success
        }
        Err(err) => output.error(err.to_string(), exit_code_for(&err)),
    }
}

// =============================================================================
// Diagnostics and Setup Commands
// =============================================================================

pub fn device_id_cmd(cmd: DeviceIdCmd, output: &Output) -> ExitCode {
    output.print_line(cast_device_id(&cmd.name))
}

pub fn accounts_cmd(_cmd: AccountsCmd, output: &Output) -> ExitCode {
    let config = Config::load();
    if config.accounts.is_empty() {
        output.info("No accounts configured");
        return ExitCode::Success;
    }

    let lines: Vec<String> = config
        .accounts
        .iter()
        .map(|(entry_id, entry)| {
            if entry.is_default {
                format!("{} (default)", entry_id)
            } else {
                entry_id.clone()
            }
        })
        .collect();
    output.print_list(&lines)
}

pub fn account_add_cmd(cmd: AccountAddCmd, output: &Output) -> ExitCode {
    let mut config = Config::load();
    let entry_id = config.add_account(AccountEntry {
        sp_dc: cmd.sp_dc,
        sp_key: cmd.sp_key,
        refresh_token: cmd.refresh_token,
        client_id: cmd.client_id,
        is_default: false,
    });

    match config.save() {
        Ok(()) => {
            output.info(format!("Stored account entry `{}`", entry_id));
            output.print_line(entry_id)
        }
        Err(err) => output.error(format!("failed to save config: {}", err), ExitCode::Error),
    }
}
