// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The Persistence Gateway (C1): the only thing allowed to mutate
//! [`MaterializedState`]. Every write validates, builds a [`JqmEvent`],
//! appends it to the [`Wal`], applies it in-process, and returns — all
//! under one lock, which is also how Highlander mode (invariant 3) and the
//! queue size bound (invariant 5) are enforced without a database to lean
//! on (see `DESIGN.md`).

use crate::event::JqmEvent;
use crate::state::MaterializedState;
use crate::wal::Wal;
use jqm_core::{
    Deliverable, DeploymentBinding, DeploymentId, GatewayError, HistoryRecord, InstanceId,
    InstanceState, JobDefId, JobDefinition, JobInstance, Message, Node, NodeId, Queue, QueueId,
    UserTags,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

impl From<crate::wal::WalError> for GatewayError {
    fn from(e: crate::wal::WalError) -> Self {
        GatewayError::BackendUnavailable(e.to_string())
    }
}

struct Inner {
    state: MaterializedState,
    wal: Wal,
}

impl Inner {
    /// Append `event` to the WAL, flush for durability, then apply it to
    /// the in-memory state — the same write path for a live request and
    /// for boot-time WAL replay (which skips straight to `apply_event`).
    fn commit(&mut self, event: JqmEvent) -> Result<(), GatewayError> {
        self.wal.append(&event)?;
        self.wal.flush()?;
        self.state.apply_event(&event);
        Ok(())
    }
}

/// Optional filters for [`Gateway::list_instances`].
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub queue: Option<QueueId>,
    pub job_definition: Option<JobDefId>,
    pub node: Option<NodeId>,
    pub state: Option<InstanceState>,
}

/// The Persistence Gateway. Cheap to clone (internally `Arc`-backed is not
/// needed since callers hold a `Gateway` behind their own `Arc`); construct
/// once per daemon process and share it across every `Poller`/`Runner`.
pub struct Gateway {
    inner: Mutex<Inner>,
}

impl Gateway {
    /// Open (or create) the WAL at `wal_path`, seeding state from `initial`
    /// (the loaded snapshot, or a fresh default) already replayed up to
    /// `processed_seq`.
    pub fn open(
        wal_path: impl AsRef<Path>,
        processed_seq: u64,
        initial: MaterializedState,
    ) -> Result<Self, GatewayError> {
        let mut wal = Wal::open(wal_path, processed_seq)?;
        let mut state = initial;
        for entry in wal.entries_after(processed_seq)? {
            state.apply_event(&entry.event);
            wal.mark_processed(entry.seq);
        }
        Ok(Self { inner: Mutex::new(Inner { state, wal }) })
    }

    /// Snapshot of the current materialized state and the WAL sequence it
    /// reflects, for `Checkpointer` to persist.
    pub fn checkpoint_view(&self) -> (MaterializedState, u64) {
        let inner = self.inner.lock();
        (inner.state.clone(), inner.wal.write_seq())
    }

    // ---- Catalog (admin entities) -------------------------------------

    pub fn register_job_definition(&self, def: JobDefinition) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::JobDefRegistered { def })
    }

    pub fn register_queue(&self, queue: Queue) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::QueueRegistered { queue })
    }

    pub fn register_node(&self, node: Node) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::NodeRegistered { node })
    }

    pub fn upsert_deployment(&self, binding: DeploymentBinding) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::DeploymentUpserted { binding })
    }

    /// Current bindings for `node`, reloaded fresh every call per
    /// `DeploymentRegistry`'s "no caching beyond one tick" contract.
    pub fn list_deployments(&self, node: &NodeId) -> Vec<DeploymentBinding> {
        self.inner.lock().state.deployments.values().filter(|b| &b.node_id == node).cloned().collect()
    }

    pub fn get_job_definition(&self, id: &JobDefId) -> Option<JobDefinition> {
        self.inner.lock().state.job_definitions.get(id).cloned()
    }

    pub fn get_queue(&self, id: &QueueId) -> Option<Queue> {
        self.inner.lock().state.queues.get(id).cloned()
    }

    pub fn get_node(&self, id: &NodeId) -> Option<Node> {
        self.inner.lock().state.nodes.get(id).cloned()
    }

    // ---- Enqueue / reservation -----------------------------------------

    /// Build and enqueue a new instance from a job definition, applying
    /// queue/priority defaults and merging runtime parameter overrides over
    /// the definition's defaults (runtime wins on key collision).
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &self,
        job_definition: &JobDefId,
        queue_override: Option<QueueId>,
        priority_override: Option<i32>,
        parameters: HashMap<String, String>,
        user_tags: UserTags,
        parent_instance: Option<InstanceId>,
        now_ms: u64,
    ) -> Result<InstanceId, GatewayError> {
        let mut inner = self.inner.lock();
        let def = inner
            .state
            .job_definitions
            .get(job_definition)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(job_definition.to_string()))?;
        let queue_id = queue_override.unwrap_or(def.default_queue);
        let queue = inner
            .state
            .queues
            .get(&queue_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(queue_id.to_string()))?;

        if !queue.is_unbounded() {
            let current = inner.state.submitted_count(&queue_id);
            if current >= queue.max_size as usize {
                return Err(GatewayError::QueueFull {
                    queue: queue.name.clone(),
                    max_size: queue.max_size,
                });
            }
        }

        let mut merged = def.default_parameters.clone();
        merged.extend(parameters);

        let priority = priority_override.unwrap_or(queue.default_priority);
        let mut instance = JobInstance::new(def.id, queue_id, priority, merged, now_ms);
        instance.user_tags = user_tags;
        instance.parent_instance = parent_instance;
        let id = instance.id;

        inner.commit(JqmEvent::InstanceEnqueued { instance })?;
        Ok(id)
    }

    /// Reserve up to `limit` runnable instances on `queue` for `node`,
    /// ordered `(priority DESC, enqueue_time ASC, id ASC)`. Instances whose
    /// job definition is Highlander-blocked are skipped entirely (left
    /// `SUBMITTED`, not locked), per invariant 3.
    pub fn reserve_next(
        &self,
        node: &NodeId,
        queue: &QueueId,
        limit: usize,
        now_ms: u64,
    ) -> Result<Vec<JobInstance>, GatewayError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut inner = self.inner.lock();

        let mut candidates: Vec<JobInstance> = inner
            .state
            .instances
            .values()
            .filter(|i| &i.queue == queue && i.state == InstanceState::Submitted)
            .filter(|i| {
                let highlander = inner
                    .state
                    .job_definitions
                    .get(&i.job_definition)
                    .is_some_and(|d| d.highlander_mode);
                !highlander || !inner.state.highlander_blocks(&i.job_definition)
            })
            .cloned()
            .collect();

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueue_time_ms.cmp(&b.enqueue_time_ms))
                .then(a.id.as_str().cmp(b.id.as_str()))
        });
        candidates.truncate(limit);

        let mut reserved = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            // Re-check Highlander per candidate: an earlier candidate in
            // this same batch may have just claimed the one Highlander
            // slot for the same job definition.
            let highlander = inner
                .state
                .job_definitions
                .get(&candidate.job_definition)
                .is_some_and(|d| d.highlander_mode);
            if highlander && inner.state.highlander_blocks(&candidate.job_definition) {
                continue;
            }
            inner.commit(JqmEvent::InstanceReserved {
                id: candidate.id,
                node_id: *node,
                at_ms: now_ms,
            })?;
            if let Some(updated) = inner.state.instances.get(&candidate.id).cloned() {
                reserved.push(updated);
            }
        }
        Ok(reserved)
    }

    /// Dispatcher rejected an admitted instance (race on capacity, or
    /// shutdown draining): CAS it back to `SUBMITTED`.
    pub fn requeue(&self, id: &InstanceId) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::InstanceRequeued { id: *id })
    }

    /// Enqueue a fresh instance that continues `parent`'s restart chain:
    /// same queue/priority/parameters/tags, `parent_instance` set to
    /// `parent.id`, `restart_count` incremented. The caller (the Runner) is
    /// responsible for checking `restart_count < JobDefinition::max_restarts`
    /// before calling this.
    pub fn enqueue_restart(&self, parent: &JobInstance, now_ms: u64) -> Result<InstanceId, GatewayError> {
        let mut inner = self.inner.lock();
        let queue = inner
            .state
            .queues
            .get(&parent.queue)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(parent.queue.to_string()))?;
        if !queue.is_unbounded() {
            let current = inner.state.submitted_count(&parent.queue);
            if current >= queue.max_size as usize {
                return Err(GatewayError::QueueFull { queue: queue.name.clone(), max_size: queue.max_size });
            }
        }
        let mut instance =
            JobInstance::new(parent.job_definition, parent.queue, parent.priority, parent.parameters.clone(), now_ms);
        instance.user_tags = parent.user_tags.clone();
        instance.parent_instance = Some(parent.id);
        instance.restart_count = parent.restart_count + 1;
        let id = instance.id;
        inner.commit(JqmEvent::InstanceEnqueued { instance })?;
        Ok(id)
    }

    // ---- Instance lifecycle --------------------------------------------

    /// `ATTRIBUTED -> RUNNING`. Returns `StateConflict` if the instance was
    /// killed or requeued between reservation and start.
    pub fn start(&self, id: &InstanceId, now_ms: u64) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        Self::expect_state(&inner.state, id, InstanceState::Attributed)?;
        inner.commit(JqmEvent::InstanceStarted { id: *id, at_ms: now_ms })
    }

    pub fn hold(&self, id: &InstanceId) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        Self::expect_state(&inner.state, id, InstanceState::Submitted)?;
        inner.commit(JqmEvent::InstanceHeld { id: *id })
    }

    pub fn resume(&self, id: &InstanceId) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        Self::expect_state(&inner.state, id, InstanceState::Hold)?;
        inner.commit(JqmEvent::InstanceResumed { id: *id })
    }

    pub fn cancel(&self, id: &InstanceId, now_ms: u64) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        let state = Self::lookup(&inner.state, id)?.state;
        if !matches!(state, InstanceState::Submitted | InstanceState::Hold) {
            return Err(GatewayError::StateConflict {
                expected: "submitted|hold".into(),
                observed: state.to_string(),
            });
        }
        inner.commit(JqmEvent::InstanceCancelled {
            id: *id,
            at_ms: now_ms,
            reason: "admin cancel".into(),
        })?;
        Self::archive(&mut inner, id, now_ms)
    }

    pub fn finish_ended(&self, id: &InstanceId, now_ms: u64) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        Self::expect_state(&inner.state, id, InstanceState::Running)?;
        inner.commit(JqmEvent::InstanceEnded { id: *id, at_ms: now_ms })?;
        Self::archive(&mut inner, id, now_ms)
    }

    pub fn finish_crashed(
        &self,
        id: &InstanceId,
        now_ms: u64,
        reason: impl Into<String>,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        let state = Self::lookup(&inner.state, id)?.state;
        if !matches!(state, InstanceState::Running | InstanceState::Attributed) {
            return Err(GatewayError::StateConflict {
                expected: "running|attributed".into(),
                observed: state.to_string(),
            });
        }
        inner.commit(JqmEvent::InstanceCrashed { id: *id, at_ms: now_ms, reason: reason.into() })?;
        Self::archive(&mut inner, id, now_ms)
    }

    pub fn finish_killed(
        &self,
        id: &InstanceId,
        now_ms: u64,
        reason: impl Into<String>,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        Self::expect_state(&inner.state, id, InstanceState::Running)?;
        inner.commit(JqmEvent::InstanceKilled { id: *id, at_ms: now_ms, reason: reason.into() })?;
        Self::archive(&mut inner, id, now_ms)
    }

    /// Boot recovery: every instance attributed to `node` in `ATTRIBUTED`
    /// or `RUNNING` transitions to `CRASHED` before any new reservation
    /// happens on `node`.
    pub fn recover_crashed(&self, node: &NodeId, now_ms: u64) -> Result<Vec<InstanceId>, GatewayError> {
        let mut inner = self.inner.lock();
        let stale: Vec<InstanceId> = inner
            .state
            .instances
            .values()
            .filter(|i| {
                i.attributed_node.as_ref() == Some(node)
                    && matches!(i.state, InstanceState::Attributed | InstanceState::Running)
            })
            .map(|i| i.id)
            .collect();
        for id in &stale {
            inner.commit(JqmEvent::InstanceCrashed {
                id: *id,
                at_ms: now_ms,
                reason: "crash recovery on boot".into(),
            })?;
            Self::archive(&mut inner, id, now_ms)?;
        }
        Ok(stale)
    }

    /// Set the cooperative-cancellation marker. Observed by the payload at
    /// its next `yield()`; does not itself change `state`.
    pub fn kill(&self, id: &InstanceId) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::PendingKillSet { id: *id })
    }

    pub fn set_priority(&self, id: &InstanceId, priority: i32) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::InstancePriorityChanged { id: *id, priority })
    }

    fn archive(inner: &mut Inner, id: &InstanceId, now_ms: u64) -> Result<(), GatewayError> {
        let instance = inner
            .state
            .instances
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        let record = HistoryRecord {
            instance_id: instance.id,
            job_definition: instance.job_definition,
            final_state: instance.state,
            enqueue_time_ms: instance.enqueue_time_ms,
            start_time_ms: instance.start_time_ms,
            end_time_ms: instance.end_time_ms.unwrap_or(now_ms),
            termination_reason: instance.termination_reason,
        };
        inner.commit(JqmEvent::HistoryArchived { record })
    }

    fn lookup<'a>(state: &'a MaterializedState, id: &InstanceId) -> Result<&'a JobInstance, GatewayError> {
        state.instances.get(id).ok_or_else(|| GatewayError::NotFound(id.to_string()))
    }

    fn expect_state(
        state: &MaterializedState,
        id: &InstanceId,
        expected: InstanceState,
    ) -> Result<(), GatewayError> {
        let observed = Self::lookup(state, id)?.state;
        if observed != expected {
            return Err(GatewayError::StateConflict {
                expected: expected.to_string(),
                observed: observed.to_string(),
            });
        }
        Ok(())
    }

    // ---- Deliverable & message log --------------------------------------

    pub fn record_message(
        &self,
        id: &InstanceId,
        text: impl Into<String>,
        now_ms: u64,
    ) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::MessageRecorded { id: *id, text: text.into(), at_ms: now_ms })
    }

    pub fn update_progress(&self, id: &InstanceId, progress: u8) -> Result<(), GatewayError> {
        self.inner.lock().commit(JqmEvent::ProgressUpdated { id: *id, progress: progress.min(100) })
    }

    /// Allocate the next deliverable id and record it in the same
    /// transaction as the caller's file move (the caller is expected to
    /// have already moved/fsynced the file before calling this; see
    /// `jqm-engine`'s `JobContext::add_deliverable`).
    pub fn record_deliverable(
        &self,
        id: &InstanceId,
        file_path: impl Into<String>,
        label: impl Into<String>,
        file_hash: impl Into<String>,
        size: u64,
        now_ms: u64,
    ) -> Result<u64, GatewayError> {
        let mut inner = self.inner.lock();
        let deliverable_id = inner.state.next_deliverable_id;
        let deliverable = Deliverable {
            id: deliverable_id,
            instance_id: *id,
            file_path: file_path.into(),
            label: label.into(),
            file_hash: file_hash.into(),
            size,
            created_at_ms: now_ms,
        };
        inner.commit(JqmEvent::DeliverableRecorded { deliverable })?;
        Ok(deliverable_id)
    }

    // ---- Read-only queries backing the client API ----------------------

    pub fn get_state(&self, id: &InstanceId) -> Option<InstanceState> {
        self.inner.lock().state.instances.get(id).map(|i| i.state)
    }

    pub fn get_instance(&self, id: &InstanceId) -> Option<JobInstance> {
        self.inner.lock().state.instances.get(id).cloned()
    }

    pub fn list_instances(&self, filters: &Filters) -> Vec<JobInstance> {
        self.inner
            .lock()
            .state
            .instances
            .values()
            .filter(|i| filters.queue.map_or(true, |q| i.queue == q))
            .filter(|i| filters.job_definition.map_or(true, |d| i.job_definition == d))
            .filter(|i| filters.node.map_or(true, |n| i.attributed_node == Some(n)))
            .filter(|i| filters.state.map_or(true, |s| i.state == s))
            .cloned()
            .collect()
    }

    pub fn get_messages(&self, id: &InstanceId) -> Vec<Message> {
        self.inner.lock().state.messages.get(id).cloned().unwrap_or_default()
    }

    pub fn get_progress(&self, id: &InstanceId) -> Option<u8> {
        self.inner.lock().state.instances.get(id).and_then(|i| i.progress)
    }

    pub fn get_deliverables(&self, id: &InstanceId) -> Vec<Deliverable> {
        self.inner.lock().state.deliverables.get(id).cloned().unwrap_or_default()
    }

    pub fn get_history(&self, id: &InstanceId) -> Option<HistoryRecord> {
        self.inner.lock().state.history.get(id).cloned()
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
