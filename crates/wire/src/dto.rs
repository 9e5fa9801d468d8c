// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-facing DTOs. Kept separate from `jqm_core`'s entities so the
//! control-socket surface can evolve independently of the storage schema —
//! today they're a thin mirror, but callers should never assume
//! `InstanceSummary` tracks `JobInstance` field-for-field.

use jqm_core::{
    Deliverable, HistoryRecord, InstanceId, InstanceState, JobDefId, JobInstance, Message, NodeId,
    QueueId, UserTags,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: InstanceId,
    pub job_definition: JobDefId,
    pub queue: QueueId,
    pub state: InstanceState,
    pub priority: i32,
    pub enqueue_time_ms: u64,
    pub attributed_node: Option<NodeId>,
    pub progress: Option<u8>,
}

impl From<&JobInstance> for InstanceSummary {
    fn from(i: &JobInstance) -> Self {
        Self {
            id: i.id,
            job_definition: i.job_definition,
            queue: i.queue,
            state: i.state,
            priority: i.priority,
            enqueue_time_ms: i.enqueue_time_ms,
            attributed_node: i.attributed_node,
            progress: i.progress,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDetail {
    pub id: InstanceId,
    pub job_definition: JobDefId,
    pub queue: QueueId,
    pub state: InstanceState,
    pub priority: i32,
    pub enqueue_time_ms: u64,
    pub attribution_time_ms: Option<u64>,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
    pub attributed_node: Option<NodeId>,
    pub progress: Option<u8>,
    pub user_tags: UserTags,
    pub parameters: std::collections::HashMap<String, String>,
    pub parent_instance: Option<InstanceId>,
    pub restart_count: u32,
    pub termination_reason: Option<String>,
}

impl From<&JobInstance> for InstanceDetail {
    fn from(i: &JobInstance) -> Self {
        Self {
            id: i.id,
            job_definition: i.job_definition,
            queue: i.queue,
            state: i.state,
            priority: i.priority,
            enqueue_time_ms: i.enqueue_time_ms,
            attribution_time_ms: i.attribution_time_ms,
            start_time_ms: i.start_time_ms,
            end_time_ms: i.end_time_ms,
            attributed_node: i.attributed_node,
            progress: i.progress,
            user_tags: i.user_tags.clone(),
            parameters: i.parameters.clone(),
            parent_instance: i.parent_instance,
            restart_count: i.restart_count,
            termination_reason: i.termination_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEntry {
    pub text: String,
    pub timestamp_ms: u64,
}

impl From<&Message> for MessageEntry {
    fn from(m: &Message) -> Self {
        Self { text: m.text.clone(), timestamp_ms: m.timestamp_ms }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverableEntry {
    pub id: u64,
    pub file_path: String,
    pub label: String,
    pub file_hash: String,
    pub size: u64,
    pub created_at_ms: u64,
}

impl From<&Deliverable> for DeliverableEntry {
    fn from(d: &Deliverable) -> Self {
        Self {
            id: d.id,
            file_path: d.file_path.clone(),
            label: d.label.clone(),
            file_hash: d.file_hash.clone(),
            size: d.size,
            created_at_ms: d.created_at_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub instance_id: InstanceId,
    pub job_definition: JobDefId,
    pub final_state: InstanceState,
    pub enqueue_time_ms: u64,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: u64,
    pub termination_reason: Option<String>,
}

impl From<&HistoryRecord> for HistoryEntry {
    fn from(h: &HistoryRecord) -> Self {
        Self {
            instance_id: h.instance_id,
            job_definition: h.job_definition,
            final_state: h.final_state,
            enqueue_time_ms: h.enqueue_time_ms,
            start_time_ms: h.start_time_ms,
            end_time_ms: h.end_time_ms,
            termination_reason: h.termination_reason.clone(),
        }
    }
}
