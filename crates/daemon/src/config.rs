// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: fixed paths under the state directory, plus the
//! tunables a TOML file at `<state_dir>/config.toml` can override. Mirrors
//! spec section 6's `node.*`/`engine.*` keys one-to-one.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_concurrent() -> u32 {
    4
}

fn default_drain_timeout_ms() -> u64 {
    30_000
}

fn default_reconcile_interval_ms() -> u64 {
    5_000
}

fn default_max_message_chars() -> usize {
    1000
}

fn default_restart_on_crash() -> bool {
    true
}

/// `node.*`/`engine.*` tunables, loadable from TOML; every field has a
/// default so an empty or missing config file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineTunables {
    pub poll_interval_ms_default: u64,
    pub max_concurrent_default: u32,
    pub drain_timeout_ms: u64,
    pub reconcile_interval_ms: u64,
    pub restart_on_crash: bool,
    pub max_message_chars: usize,
}

impl Default for EngineTunables {
    fn default() -> Self {
        Self {
            poll_interval_ms_default: default_poll_interval_ms(),
            max_concurrent_default: default_max_concurrent(),
            drain_timeout_ms: default_drain_timeout_ms(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
            restart_on_crash: default_restart_on_crash(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// Paths and tunables for one daemon process. `load` resolves fixed paths
/// under the state directory the way the teacher's own `Config::load` does,
/// then overlays `config.toml` if present.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub wal_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub deliverable_root: PathBuf,
    pub repo_path: PathBuf,
    pub tmp_path: PathBuf,
    pub node_name: String,
    pub tunables: EngineTunables,
}

impl Config {
    /// Load configuration rooted at `state_dir`, overlaying
    /// `<state_dir>/config.toml` if it exists.
    pub fn load(state_dir: PathBuf) -> Result<Self, ConfigError> {
        let config_path = state_dir.join("config.toml");
        let tunables = if config_path.exists() {
            let text = std::fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::Io { path: config_path.clone(), source })?;
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path: config_path, source })?
        } else {
            EngineTunables::default()
        };

        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            wal_path: state_dir.join("wal").join("events.wal"),
            snapshot_path: state_dir.join("snapshot.json"),
            deliverable_root: state_dir.join("deliverables"),
            repo_path: state_dir.join("repo"),
            tmp_path: state_dir.join("tmp"),
            node_name: hostname(),
            tunables,
            state_dir,
        })
    }

    /// Load configuration rooted at the platform state directory
    /// (`$XDG_STATE_HOME/jqm` or the platform equivalent via `dirs`).
    pub fn load_default() -> Result<Self, ConfigError> {
        let state_dir = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|d| d.join("jqm"))
            .ok_or_else(|| ConfigError::Io {
                path: PathBuf::from("<state-dir>"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no state directory"),
            })?;
        Self::load(state_dir)
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
