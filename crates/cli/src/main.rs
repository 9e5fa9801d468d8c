// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `jqmctl`: the admin/client CLI for a running `jqmd`.

mod client;
mod commands;

use clap::Parser;

use client::DaemonClient;
use commands::Command;

#[derive(Parser)]
#[command(name = "jqmctl", about = "Job Queue Manager control CLI")]
struct Cli {
    /// Path to jqmd's control socket. Defaults to the platform state
    /// directory's `daemon.sock`.
    #[arg(long, global = true)]
    socket: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = match cli.socket {
        Some(path) => DaemonClient::new(path),
        None => DaemonClient::connect_default()?,
    };
    commands::run(cli.command, client).await
}
