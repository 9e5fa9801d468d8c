// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! A snapshot stores the complete [`MaterializedState`] at a point in time,
//! identified by the WAL sequence number it was taken after. Recovery loads
//! the snapshot and replays only the WAL tail after that sequence, instead
//! of the whole log.

use crate::state::MaterializedState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Current snapshot schema version.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version: {0} (expected {CURRENT_SNAPSHOT_VERSION})")]
    UnsupportedVersion(u32),
}

/// A snapshot of the materialized state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "v")]
    pub version: u32,
    /// WAL sequence number at the time of snapshot.
    pub seq: u64,
    pub state: MaterializedState,
    pub created_at_ms: u64,
}

/// Load a snapshot from `path`, returning `None` if it does not exist yet
/// (a fresh deployment starting with an empty state).
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Option<Snapshot>, SnapshotError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.version != CURRENT_SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(snapshot.version));
    }
    Ok(Some(snapshot))
}

/// Write `snapshot` to `path` atomically: serialize to a sibling `.tmp` file,
/// fsync, then rename over the destination.
pub fn write_snapshot(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec(snapshot)?;
    {
        let mut file = fs::File::create(&tmp_path)?;
        use std::io::Write;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_snapshot_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        assert!(load_snapshot(&path).unwrap().is_none());
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let snapshot = Snapshot {
            version: CURRENT_SNAPSHOT_VERSION,
            seq: 42,
            state: MaterializedState::default(),
            created_at_ms: 1_000,
        };
        write_snapshot(&path, &snapshot).unwrap();
        let loaded = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded.seq, 42);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let snapshot = Snapshot {
            version: CURRENT_SNAPSHOT_VERSION + 1,
            seq: 0,
            state: MaterializedState::default(),
            created_at_ms: 0,
        };
        write_snapshot(&path, &snapshot).unwrap();
        assert!(matches!(
            load_snapshot(&path),
            Err(SnapshotError::UnsupportedVersion(_))
        ));
    }
}
