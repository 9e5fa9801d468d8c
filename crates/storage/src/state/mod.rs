// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state derived entirely from WAL replay.

mod catalog;
mod history;
mod instances;

use crate::event::JqmEvent;
use jqm_core::{
    Deliverable, DeploymentBinding, DeploymentId, HistoryRecord, JobDefId, JobDefinition,
    JobInstance, Message, Node, NodeId, Queue, QueueId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the Gateway needs to answer a query, rebuilt by replaying
/// every [`JqmEvent`] ever appended (or loaded from a [`crate::snapshot`]
/// plus the WAL tail since).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub job_definitions: HashMap<JobDefId, JobDefinition>,
    pub queues: HashMap<QueueId, Queue>,
    pub nodes: HashMap<NodeId, Node>,
    pub deployments: HashMap<DeploymentId, DeploymentBinding>,

    pub instances: HashMap<jqm_core::InstanceId, JobInstance>,
    #[serde(default)]
    pub messages: HashMap<jqm_core::InstanceId, Vec<Message>>,
    #[serde(default)]
    pub deliverables: HashMap<jqm_core::InstanceId, Vec<Deliverable>>,
    #[serde(default)]
    pub history: HashMap<jqm_core::InstanceId, HistoryRecord>,
    /// Monotonic counter backing [`Deliverable::id`] allocation.
    #[serde(default)]
    pub next_deliverable_id: u64,
}

impl MaterializedState {
    /// Instances in `SUBMITTED` for `queue`, used for invariant 5 (queue
    /// size bound).
    pub fn submitted_count(&self, queue: &QueueId) -> usize {
        self.instances
            .values()
            .filter(|i| &i.queue == queue && i.state == jqm_core::InstanceState::Submitted)
            .count()
    }

    /// `true` if some instance of `job_definition` is `ATTRIBUTED` or
    /// `RUNNING` — the Highlander predicate (invariant 3).
    pub fn highlander_blocks(&self, job_definition: &JobDefId) -> bool {
        self.instances.values().any(|i| {
            &i.job_definition == job_definition
                && matches!(
                    i.state,
                    jqm_core::InstanceState::Attributed | jqm_core::InstanceState::Running
                )
        })
    }

    /// Apply one durable fact to derive the next state.
    ///
    /// Every handler here MUST be idempotent: the Gateway applies each
    /// event immediately for read-your-writes visibility, and the daemon
    /// replays the same events again from the WAL on boot.
    pub fn apply_event(&mut self, event: &JqmEvent) {
        match event {
            JqmEvent::JobDefRegistered { .. }
            | JqmEvent::QueueRegistered { .. }
            | JqmEvent::NodeRegistered { .. }
            | JqmEvent::DeploymentUpserted { .. } => catalog::apply(self, event),

            JqmEvent::InstanceEnqueued { .. }
            | JqmEvent::InstanceReserved { .. }
            | JqmEvent::InstanceRequeued { .. }
            | JqmEvent::InstanceStarted { .. }
            | JqmEvent::InstanceHeld { .. }
            | JqmEvent::InstanceResumed { .. }
            | JqmEvent::InstanceCancelled { .. }
            | JqmEvent::InstanceEnded { .. }
            | JqmEvent::InstanceCrashed { .. }
            | JqmEvent::InstanceKilled { .. }
            | JqmEvent::InstancePriorityChanged { .. }
            | JqmEvent::PendingKillSet { .. }
            | JqmEvent::ProgressUpdated { .. }
            | JqmEvent::MessageRecorded { .. }
            | JqmEvent::DeliverableRecorded { .. } => instances::apply(self, event),

            JqmEvent::HistoryArchived { .. } => history::apply(self, event),
        }
    }
}

#[cfg(test)]
#[path = "../state_tests/mod.rs"]
mod tests;
