// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only queries a client can send to the daemon's control socket —
//! the query half of spec section 6's client API.

use jqm_core::{InstanceId, InstanceState, JobDefId, NodeId, QueueId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceFilters {
    #[serde(default)]
    pub queue: Option<QueueId>,
    #[serde(default)]
    pub job_definition: Option<JobDefId>,
    #[serde(default)]
    pub node: Option<NodeId>,
    #[serde(default)]
    pub state: Option<InstanceState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Query {
    GetState { id: InstanceId },
    GetInstance { id: InstanceId },
    ListInstances {
        #[serde(default)]
        filters: InstanceFilters,
    },
    GetMessages { id: InstanceId },
    GetProgress { id: InstanceId },
    GetDeliverables { id: InstanceId },
    DownloadDeliverable { id: InstanceId, deliverable_id: u64 },
    GetHistory { id: InstanceId },
    ListDeployments { node: NodeId },
    Status,
}
