// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! JobInstance: one execution, its state machine, and the side records
//! (runtime parameters, messages, deliverables, history) attached to it.

use crate::job_definition::JobDefId;
use crate::node::NodeId;
use crate::queue::QueueId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job instance (a.k.a. job request).
    pub struct InstanceId("inst-");
}

/// The eight states a [`JobInstance`] moves through. See the transition
/// table in [`InstanceState::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Submitted,
    Hold,
    Attributed,
    Running,
    Ended,
    Crashed,
    Killed,
    Cancelled,
}

crate::simple_display! {
    InstanceState {
        Submitted => "submitted",
        Hold => "hold",
        Attributed => "attributed",
        Running => "running",
        Ended => "ended",
        Crashed => "crashed",
        Killed => "killed",
        Cancelled => "cancelled",
    }
}

impl InstanceState {
    /// Terminal states never transition again; a [`crate::HistoryRecord`]
    /// must exist for every instance that has ever reached one.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Crashed | Self::Killed | Self::Cancelled)
    }

    /// The legal transition table from spec section 4.7. Every transition in
    /// the engine is a CAS on `(id, state)`; losers of the CAS must not
    /// perform the transition's side effects, so this check is what the
    /// gateway consults before applying one.
    pub fn can_transition_to(self, to: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, to),
            (Submitted, Attributed)
                | (Submitted, Hold)
                | (Hold, Submitted)
                | (Submitted, Cancelled)
                | (Hold, Cancelled)
                | (Attributed, Running)
                | (Attributed, Submitted)
                | (Running, Ended)
                | (Running, Crashed)
                | (Running, Killed)
                | (Attributed, Crashed) // boot recovery
        )
    }
}

/// Opaque, caller-supplied classification tags attached to an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserTags {
    pub application: Option<String>,
    pub module: Option<String>,
    pub keyword1: Option<String>,
    pub keyword2: Option<String>,
    pub keyword3: Option<String>,
    pub session_id: Option<String>,
    pub user: Option<String>,
    pub mail: Option<String>,
}

/// One execution of a [`crate::JobDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInstance {
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
    /// 0..=100, clamped by `send_progress`.
    pub progress: Option<u8>,
    pub user_tags: UserTags,
    pub parameters: HashMap<String, String>,
    pub parent_instance: Option<InstanceId>,
    /// Number of restart hops already taken in this crash-restart chain.
    pub restart_count: u32,
    /// Recorded on every terminal transition; the engine never swallows a
    /// failure silently.
    pub termination_reason: Option<String>,
    /// Set by `kill`/timeout watchdog; observed cooperatively at `yield()`.
    pub pending_kill: bool,
}

impl JobInstance {
    pub fn new(
        job_definition: JobDefId,
        queue: QueueId,
        priority: i32,
        parameters: HashMap<String, String>,
        enqueue_time_ms: u64,
    ) -> Self {
        Self {
            id: InstanceId::new(),
            job_definition,
            queue,
            state: InstanceState::Submitted,
            priority,
            enqueue_time_ms,
            attribution_time_ms: None,
            start_time_ms: None,
            end_time_ms: None,
            attributed_node: None,
            progress: None,
            user_tags: UserTags::default(),
            parameters,
            parent_instance: None,
            restart_count: 0,
            termination_reason: None,
            pending_kill: false,
        }
    }

    /// Invariant 2: `attributed_node` is null iff `state ∈ {SUBMITTED, HOLD}`.
    pub fn attribution_invariant_holds(&self) -> bool {
        let should_be_null =
            matches!(self.state, InstanceState::Submitted | InstanceState::Hold);
        self.attributed_node.is_none() == should_be_null
    }

    /// Invariant 4a: `start_time >= attribution_time >= enqueue_time`.
    pub fn ordering_invariant_holds(&self) -> bool {
        if let Some(attr) = self.attribution_time_ms {
            if attr < self.enqueue_time_ms {
                return false;
            }
            if let Some(start) = self.start_time_ms {
                if start < attr {
                    return false;
                }
            }
        }
        true
    }

    /// Invariant 4b: `end_time` is set iff state is terminal.
    pub fn end_time_invariant_holds(&self) -> bool {
        self.end_time_ms.is_some() == self.state.is_terminal()
    }
}

/// A single runtime parameter override, keyed by instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeParameter {
    pub instance_id: InstanceId,
    pub key: String,
    pub value: String,
}

/// Truncation length enforced on every [`Message`] body. Overridable via
/// `engine.maxMessageChars`.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub instance_id: InstanceId,
    pub text: String,
    pub timestamp_ms: u64,
}

impl Message {
    pub fn new(instance_id: InstanceId, text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new_with_limit(instance_id, text, timestamp_ms, DEFAULT_MAX_MESSAGE_CHARS)
    }

    pub fn new_with_limit(
        instance_id: InstanceId,
        text: impl Into<String>,
        timestamp_ms: u64,
        max_chars: usize,
    ) -> Self {
        let mut text = text.into();
        if text.chars().count() > max_chars {
            text = text.chars().take(max_chars).collect();
        }
        Self { instance_id, text, timestamp_ms }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: u64,
    pub instance_id: InstanceId,
    pub file_path: String,
    pub label: String,
    pub file_hash: String,
    pub size: u64,
    pub created_at_ms: u64,
}

/// Immutable terminal snapshot, produced when an instance leaves a running
/// state for a terminal state; survives instance GC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub instance_id: InstanceId,
    pub job_definition: JobDefId,
    pub final_state: InstanceState,
    pub enqueue_time_ms: u64,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: u64,
    pub termination_reason: Option<String>,
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
