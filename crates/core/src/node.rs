// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Node: a process that can run instances.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a node.
    pub struct NodeId("node-");
}

/// A worker process capable of executing job instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Content-addressed artifact cache root.
    pub repo_path: PathBuf,
    /// Per-instance scratch directory root.
    pub tmp_path: PathBuf,
    pub enabled: bool,
}

impl Node {
    pub fn new(name: impl Into<String>, repo_path: PathBuf, tmp_path: PathBuf) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            host: "localhost".to_string(),
            port: 0,
            repo_path,
            tmp_path,
            enabled: true,
        }
    }
}

crate::builder! {
    pub struct NodeBuilder => Node {
        into {
            name: String = "test-node",
            host: String = "localhost",
        }
        set {
            port: u16 = 0,
            repo_path: PathBuf = PathBuf::from("/tmp/jqm-repo"),
            tmp_path: PathBuf = PathBuf::from("/tmp/jqm-tmp"),
            enabled: bool = true,
        }
        computed {
            id: NodeId = NodeId::new(),
        }
    }
}
