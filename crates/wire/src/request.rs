// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Requests a client can send to the daemon over the control socket.

use jqm_core::{
    DeploymentBinding, InstanceId, JobDefId, JobDefinition, Node, Queue, QueueId, UserTags,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::query::Query;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping,
    Shutdown,

    RegisterJobDefinition { def: JobDefinition },
    RegisterQueue { queue: Queue },
    RegisterNode { node: Node },
    UpsertDeployment { binding: DeploymentBinding },

    Enqueue {
        job_definition: JobDefId,
        queue_override: Option<QueueId>,
        priority_override: Option<i32>,
        parameters: HashMap<String, String>,
        user_tags: UserTags,
    },
    Hold { id: InstanceId },
    Resume { id: InstanceId },
    Cancel { id: InstanceId },
    Kill { id: InstanceId },
    SetPriority { id: InstanceId, priority: i32 },

    Query { query: Query },
}
