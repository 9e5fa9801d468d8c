// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Admin-entity registration: job definitions, queues, nodes, deployments.

use super::MaterializedState;
use crate::event::JqmEvent;

pub(crate) fn apply(state: &mut MaterializedState, event: &JqmEvent) {
    match event {
        JqmEvent::JobDefRegistered { def } => {
            state.job_definitions.insert(def.id, def.clone());
        }
        JqmEvent::QueueRegistered { queue } => {
            state.queues.insert(queue.id, queue.clone());
        }
        JqmEvent::NodeRegistered { node } => {
            state.nodes.insert(node.id, node.clone());
        }
        JqmEvent::DeploymentUpserted { binding } => {
            state.deployments.insert(binding.id, binding.clone());
        }
        _ => {}
    }
}
