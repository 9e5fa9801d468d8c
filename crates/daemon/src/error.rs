// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced by daemon startup, shutdown, and the control-socket
//! listener.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock at {0}: daemon already running?")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("wal error: {0}")]
    Wal(#[from] jqm_storage::WalError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] jqm_storage::SnapshotError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gateway error: {0}")]
    Gateway(#[from] jqm_core::GatewayError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("invalid TOML in {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] jqm_wire::ProtocolError),
}
