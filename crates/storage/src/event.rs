// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only fact stream persisted to the WAL. `MaterializedState`
//! is entirely derived by replaying these; nothing else is durable.
//!
//! # Idempotency requirement
//!
//! Every `apply` handler in `state/` MUST be idempotent: applying the same
//! event twice must produce the same state as applying it once, because
//! `Gateway` applies events immediately for read-your-writes visibility and
//! the daemon replays the same events again from the WAL on boot.

use jqm_core::{Deliverable, DeploymentBinding, HistoryRecord, JobDefinition, JobInstance, Node, Queue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JqmEvent {
    JobDefRegistered { def: JobDefinition },
    QueueRegistered { queue: Queue },
    NodeRegistered { node: Node },
    DeploymentUpserted { binding: DeploymentBinding },

    InstanceEnqueued { instance: JobInstance },
    InstanceReserved { id: jqm_core::InstanceId, node_id: jqm_core::NodeId, at_ms: u64 },
    InstanceRequeued { id: jqm_core::InstanceId },
    InstanceStarted { id: jqm_core::InstanceId, at_ms: u64 },
    InstanceHeld { id: jqm_core::InstanceId },
    InstanceResumed { id: jqm_core::InstanceId },
    InstanceCancelled { id: jqm_core::InstanceId, at_ms: u64, reason: String },
    InstanceEnded { id: jqm_core::InstanceId, at_ms: u64 },
    InstanceCrashed { id: jqm_core::InstanceId, at_ms: u64, reason: String },
    InstanceKilled { id: jqm_core::InstanceId, at_ms: u64, reason: String },
    InstancePriorityChanged { id: jqm_core::InstanceId, priority: i32 },
    PendingKillSet { id: jqm_core::InstanceId },

    ProgressUpdated { id: jqm_core::InstanceId, progress: u8 },
    MessageRecorded { id: jqm_core::InstanceId, text: String, at_ms: u64 },
    DeliverableRecorded { deliverable: Deliverable },
    HistoryArchived { record: HistoryRecord },
}
