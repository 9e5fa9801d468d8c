// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The Engine Supervisor (C9): the one thing a node's daemon process
//! starts. On boot it runs crash recovery for this node, then starts one
//! `Poller`/`Dispatcher` pair per enabled `DeploymentBinding`. On a timer
//! it diffs the registry against what's running and starts/stops bindings
//! that changed; on shutdown it drains every dispatcher before returning.

use jqm_core::{DeploymentBinding, DeploymentId, GatewayError, Node};
use jqm_storage::Gateway;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;
use crate::registry::DeploymentRegistry;
use crate::runner::Runner;
use crate::sandbox::Sandbox;
use crate::EpochMillis;

struct RunningBinding {
    shutdown_tx: watch::Sender<bool>,
    poller_handle: JoinHandle<()>,
    dispatcher: Arc<Dispatcher>,
    max_concurrent: u32,
}

pub struct Supervisor<S: Sandbox> {
    gateway: Arc<Gateway>,
    registry: Arc<DeploymentRegistry>,
    node: Node,
    sandbox: Arc<S>,
    deliverable_root: PathBuf,
    max_message_chars: usize,
    now: EpochMillis,
    drain_timeout: Duration,
    running: parking_lot::Mutex<HashMap<DeploymentId, RunningBinding>>,
}

impl<S: Sandbox> Supervisor<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<Gateway>,
        registry: Arc<DeploymentRegistry>,
        node: Node,
        sandbox: Arc<S>,
        deliverable_root: PathBuf,
        max_message_chars: usize,
        now: EpochMillis,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            registry,
            node,
            sandbox,
            deliverable_root,
            max_message_chars,
            now,
            drain_timeout,
            running: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Mark every instance this node left `ATTRIBUTED`/`RUNNING` on a
    /// previous, uncleanly-ended process as `CRASHED`. Must run before any
    /// binding starts reserving new work.
    pub fn recover(&self) -> Result<usize, GatewayError> {
        let now_ms = (self.now)();
        let recovered = self.gateway.recover_crashed(&self.node.id, now_ms)?;
        if !recovered.is_empty() {
            tracing::info!(node = %self.node.id, count = recovered.len(), "recovered stale instances on boot");
        }
        Ok(recovered.len())
    }

    /// Start/stop `Poller`/`Dispatcher` pairs to match the registry's
    /// current bindings for this node. Safe to call repeatedly; only
    /// bindings that are new, removed, or have a changed `maxConcurrent`
    /// (which requires a new semaphore) are touched.
    pub async fn reconcile(&self) {
        let current = self.registry.bindings_for(&self.node.id);
        let current_ids: HashSet<DeploymentId> = current.iter().map(|b| b.id).collect();

        let stale: Vec<DeploymentId> = {
            let running = self.running.lock();
            running.keys().filter(|id| !current_ids.contains(id)).copied().collect()
        };
        for id in stale {
            self.stop_binding(&id).await;
        }

        for binding in current {
            let needs_restart = {
                let running = self.running.lock();
                match running.get(&binding.id) {
                    None => true,
                    Some(r) => r.max_concurrent != binding.max_concurrent,
                }
            };
            if needs_restart {
                self.stop_binding(&binding.id).await;
                self.start_binding(binding);
            }
        }
    }

    fn start_binding(&self, binding: DeploymentBinding) {
        let dispatcher = Arc::new(Dispatcher::new(binding.max_concurrent as usize));
        let runner = Arc::new(Runner::new(
            self.gateway.clone(),
            self.sandbox.clone(),
            self.node.clone(),
            self.deliverable_root.clone(),
            self.max_message_chars,
            self.now.clone(),
        ));
        let poller = Arc::new(crate::poller::Poller::new(
            self.gateway.clone(),
            self.registry.clone(),
            dispatcher.clone(),
            runner,
            self.node.id,
            binding.id,
            Duration::from_millis(binding.poll_interval_ms.max(1)),
            self.now.clone(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller_handle = tokio::spawn(poller.run(shutdown_rx));
        self.running.lock().insert(
            binding.id,
            RunningBinding { shutdown_tx, poller_handle, dispatcher, max_concurrent: binding.max_concurrent },
        );
        tracing::info!(binding = %binding.id, node = %self.node.id, "started poller for deployment binding");
    }

    async fn stop_binding(&self, id: &DeploymentId) {
        let removed = self.running.lock().remove(id);
        let Some(running) = removed else { return };
        let _ = running.shutdown_tx.send(true);
        running.dispatcher.drain(self.drain_timeout).await;
        let _ = running.poller_handle.await;
        tracing::info!(binding = %id, node = %self.node.id, "stopped poller for deployment binding");
    }

    /// Stop every running binding, draining in-flight Runners first.
    pub async fn shutdown(&self) {
        let ids: Vec<DeploymentId> = self.running.lock().keys().copied().collect();
        for id in ids {
            self.stop_binding(&id).await;
        }
    }

    /// Boot recovery, an initial reconcile, then re-reconcile every
    /// `reconcile_interval` until `shutdown` fires, at which point every
    /// binding is drained before returning.
    pub async fn run(self: Arc<Self>, reconcile_interval: Duration, mut shutdown: watch::Receiver<bool>) -> Result<(), GatewayError> {
        self.recover()?;
        self.reconcile().await;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(reconcile_interval) => self.reconcile().await,
                _ = shutdown.changed() => break,
            }
        }
        self.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
