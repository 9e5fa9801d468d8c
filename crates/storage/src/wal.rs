// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of [`JqmEvent`]s, one JSON object per line.
//!
//! Each entry carries a monotonic `seq`. `processed_seq` tracks how far a
//! reader has consumed the log (persisted only in memory here; a snapshot
//! plus `processed_seq` at snapshot time is what makes recovery cheap —
//! see [`crate::snapshot`]).

use crate::event::JqmEvent;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt WAL entry at byte offset {offset}: {source}")]
    Corrupt { offset: u64, source: serde_json::Error },
}

/// One durable fact plus its position in the log.
#[derive(Debug, Clone)]
pub struct WalEntry {
    pub seq: u64,
    pub event: JqmEvent,
}

#[derive(Serialize, Deserialize)]
struct OnDiskEntry {
    seq: u64,
    event: JqmEvent,
}

use serde::{Deserialize, Serialize};

/// Append-only event log with an in-process read cursor.
pub struct Wal {
    path: PathBuf,
    file: File,
    write_seq: u64,
    processed_seq: u64,
    /// Byte offset the next `next_unprocessed` read should resume from.
    read_offset: u64,
}

impl Wal {
    /// Open (creating if absent) the log at `path`, and prime the read
    /// cursor to resume just after `processed_seq` (the seq recorded in the
    /// last snapshot, or 0 for a fresh log).
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;

        let mut write_seq = 0u64;
        let mut read_offset = 0u64;
        {
            let mut reader = BufReader::new(File::open(&path)?);
            let mut offset = 0u64;
            let mut line = String::new();
            loop {
                line.clear();
                let n = reader.read_line(&mut line)?;
                if n == 0 {
                    break;
                }
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    offset += n as u64;
                    continue;
                }
                let entry: OnDiskEntry = serde_json::from_str(trimmed)
                    .map_err(|source| WalError::Corrupt { offset, source })?;
                write_seq = entry.seq;
                offset += n as u64;
                if entry.seq <= processed_seq {
                    read_offset = offset;
                }
            }
        }

        Ok(Self { path, file, write_seq, processed_seq, read_offset })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest sequence number ever written.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Highest sequence number the reader has marked processed.
    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Append one event, returning its assigned sequence number. Not
    /// flushed until [`Wal::flush`] — callers that need durability before
    /// acting on the event (every Gateway write) must flush explicitly.
    pub fn append(&mut self, event: &JqmEvent) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = OnDiskEntry { seq: self.write_seq, event: event.clone() };
        let mut line = serde_json::to_string(&entry).map_err(|source| WalError::Corrupt {
            offset: 0,
            source,
        })?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        Ok(self.write_seq)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Read and return the next entry after the read cursor, without
    /// advancing `processed_seq` (call [`Wal::mark_processed`] once the
    /// entry has been durably applied).
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(self.read_offset))?;
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            self.read_offset += n as u64;
            return self.next_unprocessed();
        }
        let entry: OnDiskEntry = serde_json::from_str(trimmed).map_err(|source| {
            WalError::Corrupt { offset: self.read_offset, source }
        })?;
        self.read_offset += n as u64;
        Ok(Some(WalEntry { seq: entry.seq, event: entry.event }))
    }

    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// All entries with `seq > after`, in order. Used at boot to replay the
    /// tail of the log onto a loaded snapshot.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        let mut file = File::open(&self.path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let mut out = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: OnDiskEntry =
                serde_json::from_str(line).map_err(|source| WalError::Corrupt { offset: 0, source })?;
            if entry.seq > after {
                out.push(WalEntry { seq: entry.seq, event: entry.event });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
