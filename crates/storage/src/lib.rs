// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jqm-storage: the Persistence Gateway (C1) and Queue Store (C2).
//!
//! Event-sourced: an append-only [`Wal`] of [`JqmEvent`]s plus a
//! [`MaterializedState`] derived by replaying them. [`Gateway`] is the only
//! thing allowed to mutate state; it validates, appends to the WAL, applies
//! the event in-process, and returns — the same write path regardless of
//! whether the caller is a live request or boot-time WAL replay.

mod checkpoint;
mod event;
mod gateway;
mod snapshot;
mod state;
mod wal;

pub use checkpoint::Checkpointer;
pub use event::JqmEvent;
pub use gateway::{Filters, Gateway};
pub use snapshot::{load_snapshot, Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use wal::{Wal, WalEntry, WalError};
