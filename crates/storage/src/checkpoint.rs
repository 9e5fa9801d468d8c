// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic snapshotting so boot recovery doesn't replay the whole WAL.

use crate::snapshot::{write_snapshot, Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
use crate::state::MaterializedState;
use std::fs;
use std::path::{Path, PathBuf};

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`. The
/// oldest backup is removed when the limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

/// Writes snapshots of a [`MaterializedState`] to a fixed path, keeping a
/// rotation of backups of the previous snapshot before overwriting it.
pub struct Checkpointer {
    snapshot_path: PathBuf,
}

impl Checkpointer {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self { snapshot_path: snapshot_path.into() }
    }

    /// Snapshot `state` as of WAL sequence `seq`, backing up the previous
    /// snapshot file first so a crash mid-write never loses both copies.
    pub fn checkpoint(
        &self,
        state: &MaterializedState,
        seq: u64,
        now_ms: u64,
    ) -> Result<(), SnapshotError> {
        if self.snapshot_path.exists() {
            let bak = rotate_bak_path(&self.snapshot_path);
            fs::rename(&self.snapshot_path, bak)?;
        }
        let snapshot = Snapshot {
            version: CURRENT_SNAPSHOT_VERSION,
            seq,
            state: state.clone(),
            created_at_ms: now_ms,
        };
        write_snapshot(&self.snapshot_path, &snapshot)
    }
}
