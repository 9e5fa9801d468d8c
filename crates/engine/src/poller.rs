// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The Poller (C4): one per `DeploymentBinding`. Each tick re-reads the
//! binding from the registry (so `enabled`/`maxConcurrent` edits land on
//! the very next tick), asks the gateway for as many runnable instances
//! as the dispatcher has free capacity for, and hands each one to the
//! dispatcher. A `BackendUnavailable` gateway error backs the tick off
//! with full jitter instead of busy-looping against a struggling store.

use jqm_core::{DeploymentId, NodeId};
use jqm_storage::Gateway;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::dispatcher::Dispatcher;
use crate::registry::DeploymentRegistry;
use crate::runner::Runner;
use crate::sandbox::Sandbox;
use crate::EpochMillis;

const MIN_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct Poller<S: Sandbox> {
    gateway: Arc<Gateway>,
    registry: Arc<DeploymentRegistry>,
    dispatcher: Arc<Dispatcher>,
    runner: Arc<Runner<S>>,
    node: NodeId,
    binding: DeploymentId,
    /// Used when the binding can't be found (e.g. deleted mid-flight) or
    /// is dormant, so the tick still backs off sanely.
    fallback_interval: Duration,
    now: EpochMillis,
}

impl<S: Sandbox> Poller<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<Gateway>,
        registry: Arc<DeploymentRegistry>,
        dispatcher: Arc<Dispatcher>,
        runner: Arc<Runner<S>>,
        node: NodeId,
        binding: DeploymentId,
        fallback_interval: Duration,
        now: EpochMillis,
    ) -> Self {
        Self { gateway, registry, dispatcher, runner, node, binding, fallback_interval, now }
    }

    /// Run ticks until `shutdown` fires. Consumes `self` via `Arc` so it
    /// can be spawned directly with `tokio::spawn`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Duration::ZERO;
        loop {
            if *shutdown.borrow() {
                return;
            }

            let binding = self.registry.bindings_for(&self.node).into_iter().find(|b| b.id == self.binding);
            let Some(binding) = binding else {
                if Self::sleep_or_shutdown(&mut shutdown, self.fallback_interval).await {
                    return;
                }
                continue;
            };
            if binding.is_dormant() {
                if Self::sleep_or_shutdown(&mut shutdown, Duration::from_millis(binding.poll_interval_ms)).await {
                    return;
                }
                continue;
            }

            let free = self.dispatcher.free_slots();
            if free == 0 {
                if Self::sleep_or_shutdown(&mut shutdown, Duration::from_millis(binding.poll_interval_ms)).await {
                    return;
                }
                continue;
            }

            let now_ms = (self.now)();
            match self.gateway.reserve_next(&self.node, &binding.queue_id, free, now_ms) {
                Ok(reserved) => {
                    backoff = Duration::ZERO;
                    for instance in reserved {
                        let id = instance.id;
                        let runner = self.runner.clone();
                        if self.dispatcher.try_admit(move || async move { runner.run(instance).await }).is_err() {
                            if let Err(e) = self.gateway.requeue(&id) {
                                tracing::warn!(instance = %id, error = %e, "could not requeue a rejected reservation");
                            }
                        }
                    }
                    if Self::sleep_or_shutdown(&mut shutdown, Duration::from_millis(binding.poll_interval_ms)).await {
                        return;
                    }
                }
                Err(e) if e.is_transient() => {
                    backoff = next_backoff(backoff);
                    tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "backend unavailable; backing off");
                    if Self::sleep_or_shutdown(&mut shutdown, backoff).await {
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "reservation failed");
                    if Self::sleep_or_shutdown(&mut shutdown, Duration::from_millis(binding.poll_interval_ms)).await {
                        return;
                    }
                }
            }
        }
    }

    async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, dur: Duration) -> bool {
        if *shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => false,
            _ = shutdown.changed() => true,
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    let base = if current.is_zero() { MIN_BACKOFF } else { (current * 2).min(MAX_BACKOFF) };
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64);
    Duration::from_millis(jitter_ms.max(1))
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
