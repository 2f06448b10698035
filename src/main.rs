//! castbridge - bridge a music-service account to cast devices
//!
//! Embedded in a home-automation platform the bridge is driven through
//! its library API; this binary exposes the same surface for scripting
//! and diagnostics.

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, Output};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = Output::new(&cli);
    let account = cli.account.as_deref();

    let code = match cli.command {
        Command::Playlists(cmd) => commands::playlists_cmd(cmd, account, &output).await,
        Command::Devices(cmd) => commands::devices_cmd(cmd, account, &output).await,
        Command::Categories(cmd) => commands::categories_cmd(cmd, account, &output).await,
        Command::Liked(cmd) => commands::liked_cmd(cmd, account, &output).await,
        Command::LikedCount(cmd) => commands::liked_count_cmd(cmd, account, &output).await,
        Command::Play(cmd) => commands::play_cmd(cmd, account, &output).await,
        Command::DeviceId(cmd) => commands::device_id_cmd(cmd, &output),
        Command::Accounts(cmd) => commands::accounts_cmd(cmd, &output),
        Command::AccountAdd(cmd) => commands::account_add_cmd(cmd, &output),
    };

    code.into()
}
