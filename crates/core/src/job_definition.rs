// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! JobDefinition: the template for an execution ("what to run").

use crate::queue::QueueId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job definition.
    pub struct JobDefId("jobd-");
}

/// Default maximum number of restart-on-crash chains, used when a
/// `JobDefinition` does not override it. See DESIGN.md for the rationale
/// (the source spec references a restart limit without bounding it).
pub const DEFAULT_MAX_RESTARTS: u32 = 1;

/// Template describing a runnable application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: JobDefId,
    pub application_name: String,
    pub entry_point_class: String,
    pub artifact_path: String,
    pub default_queue: QueueId,
    pub can_restart: bool,
    /// "There can be only one": at most one live instance of this definition
    /// may be `ATTRIBUTED`/`RUNNING` at a time.
    pub highlander_mode: bool,
    pub default_parameters: HashMap<String, String>,
    /// Maximum number of restart hops in a single crash-restart chain.
    pub max_restarts: u32,
}

impl JobDefinition {
    pub fn new(application_name: impl Into<String>, default_queue: QueueId) -> Self {
        Self {
            id: JobDefId::new(),
            application_name: application_name.into(),
            entry_point_class: String::new(),
            artifact_path: String::new(),
            default_queue,
            can_restart: false,
            highlander_mode: false,
            default_parameters: HashMap::new(),
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }
}

crate::builder! {
    pub struct JobDefinitionBuilder => JobDefinition {
        into {
            application_name: String = "TestApp",
            entry_point_class: String = "com.example.Main",
            artifact_path: String = "file:///artifacts/test.jar",
        }
        set {
            default_queue: QueueId = QueueId::new(),
            can_restart: bool = false,
            highlander_mode: bool = false,
            default_parameters: HashMap<String, String> = HashMap::new(),
            max_restarts: u32 = DEFAULT_MAX_RESTARTS,
        }
        computed {
            id: JobDefId = JobDefId::new(),
        }
    }
}
