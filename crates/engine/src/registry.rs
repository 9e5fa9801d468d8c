// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The Deployment Registry (C3): the node's view of which queues it is
//! bound to consume. Deliberately stateless beyond the gateway — every
//! call re-reads the catalog, so a `jqmctl deployment` change takes effect
//! on the Poller's very next tick without any cache-invalidation plumbing.

use jqm_core::{DeploymentBinding, NodeId};
use jqm_storage::Gateway;
use std::sync::Arc;

pub struct DeploymentRegistry {
    gateway: Arc<Gateway>,
}

impl DeploymentRegistry {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// All bindings currently configured for `node`, enabled or not — the
    /// Supervisor decides what to do with dormant ones.
    pub fn bindings_for(&self, node: &NodeId) -> Vec<DeploymentBinding> {
        self.gateway.list_deployments(node)
    }
}
