// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal history archival (invariant 6).

use super::MaterializedState;
use crate::event::JqmEvent;

pub(crate) fn apply(state: &mut MaterializedState, event: &JqmEvent) {
    if let JqmEvent::HistoryArchived { record } = event {
        state.history.entry(record.instance_id).or_insert_with(|| record.clone());
    }
}
