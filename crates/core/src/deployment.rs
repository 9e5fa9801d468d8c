// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! DeploymentBinding: (Node, Queue, maxConcurrent, pollIntervalMs) — the
//! only way a queue is consumed.

use crate::node::NodeId;
use crate::queue::QueueId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a deployment binding.
    pub struct DeploymentId("jdpl-");
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentBinding {
    pub id: DeploymentId,
    pub node_id: NodeId,
    pub queue_id: QueueId,
    pub max_concurrent: u32,
    pub poll_interval_ms: u64,
    pub enabled: bool,
}

impl DeploymentBinding {
    pub fn new(node_id: NodeId, queue_id: QueueId, max_concurrent: u32, poll_interval_ms: u64) -> Self {
        Self {
            id: DeploymentId::new(),
            node_id,
            queue_id,
            max_concurrent,
            poll_interval_ms,
            enabled: true,
        }
    }

    /// A binding that currently can't pull any work: disabled, or zero
    /// concurrency, per the poller's tick contract.
    pub fn is_dormant(&self) -> bool {
        !self.enabled || self.max_concurrent == 0
    }
}
