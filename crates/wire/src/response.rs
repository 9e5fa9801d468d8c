// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Responses the daemon sends back over the control socket. Every
//! `Request`/`Query` variant has exactly one matching `Response` shape; a
//! mismatched pair is a protocol bug, not something a client should try to
//! recover from.

use jqm_core::{DeploymentBinding, InstanceId, InstanceState};
use serde::{Deserialize, Serialize};

use crate::dto::{DeliverableEntry, HistoryEntry, InstanceDetail, InstanceSummary, MessageEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Ack,
    Error { message: String },

    InstanceId { id: InstanceId },
    State { state: Option<InstanceState> },
    Instance { instance: Option<InstanceDetail> },
    Instances { instances: Vec<InstanceSummary> },
    Messages { messages: Vec<MessageEntry> },
    Progress { progress: Option<u8> },
    Deliverables { deliverables: Vec<DeliverableEntry> },
    DeliverableBytes { bytes: Vec<u8> },
    History { record: Option<HistoryEntry> },
    Deployments { deployments: Vec<DeploymentBinding> },
    Status { node: String, uptime_secs: u64 },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }
}
