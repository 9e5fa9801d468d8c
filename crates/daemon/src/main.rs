// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `jqmd`: one Job Queue Manager node process.

use std::path::PathBuf;

use clap::Parser;
use jqm_daemon::Config;

#[derive(Parser, Debug)]
#[command(name = "jqmd", about = "Job Queue Manager node daemon")]
struct Args {
    /// Root state directory. Defaults to the platform state directory
    /// (`$XDG_STATE_HOME/jqm` or equivalent).
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_logging();
    let args = Args::parse();

    let config = match args.state_dir {
        Some(dir) => Config::load(dir),
        None => Config::load_default(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return std::process::ExitCode::FAILURE;
        }
    };

    match jqm_daemon::run(config).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "daemon exited with an error");
            std::process::ExitCode::FAILURE
        }
    }
}
