// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The Runner (C6): owns one instance from `ATTRIBUTED` through a terminal
//! state. Prepare → materialize parameters → `ATTRIBUTED -> RUNNING` →
//! invoke → finalize, per spec section 4.6. Never panics: any failure path
//! ends in a terminal transition, because an instance stuck mid-flight
//! with no `HistoryRecord` is the one invariant this crate cannot let
//! slip.

use jqm_core::{GatewayError, JobInstance, Node, RunnerError};
use jqm_storage::Gateway;
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::JobContext;
use crate::sandbox::Sandbox;
use crate::EpochMillis;

pub struct Runner<S: Sandbox> {
    gateway: Arc<Gateway>,
    sandbox: Arc<S>,
    node: Node,
    deliverable_root: PathBuf,
    max_message_chars: usize,
    now: EpochMillis,
}

impl<S: Sandbox> Runner<S> {
    pub fn new(
        gateway: Arc<Gateway>,
        sandbox: Arc<S>,
        node: Node,
        deliverable_root: PathBuf,
        max_message_chars: usize,
        now: EpochMillis,
    ) -> Self {
        Self { gateway, sandbox, node, deliverable_root, max_message_chars, now }
    }

    /// Drive `instance` (already `ATTRIBUTED` to this node) to completion.
    /// Never returns an error: every failure is recorded as a terminal
    /// transition on the instance itself, not propagated to the caller
    /// (the Dispatcher has nothing useful to do with it).
    pub async fn run(&self, instance: JobInstance) {
        let id = instance.id;
        if let Err(e) = self.run_inner(instance).await {
            tracing::error!(instance = %id, error = %e, "runner could not finalize instance");
        }
    }

    async fn run_inner(&self, instance: JobInstance) -> Result<(), RunnerError> {
        let def = self
            .gateway
            .get_job_definition(&instance.job_definition)
            .ok_or_else(|| RunnerError::ArtifactUnavailable("job definition no longer registered".into()))?;

        // Prepare happens before RUNNING: a bad artifact is a
        // configuration error, not a payload failure, and must not count
        // against the restart budget.
        if let Err(e) = self.sandbox.prepare(&def).await {
            let end_ms = (self.now)();
            self.gateway.finish_crashed(&instance.id, end_ms, e.to_string())?;
            return Ok(());
        }

        let start_ms = (self.now)();
        if let Err(e) = self.gateway.start(&instance.id, start_ms) {
            // Lost the race: the instance was killed or requeued between
            // reservation and here. Nothing left for this Runner to do.
            if matches!(e, GatewayError::StateConflict { .. }) {
                return Ok(());
            }
            return Err(e.into());
        }

        let work_dir = self.node.tmp_path.join(instance.id.as_str());
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| RunnerError::Payload(format!("creating work dir: {e}")))?;

        let ctx = Arc::new(JobContext::new(
            self.gateway.clone(),
            instance.id,
            work_dir.clone(),
            self.deliverable_root.clone(),
            self.now.clone(),
            self.max_message_chars,
        ));

        let outcome = self.sandbox.execute(&def, instance.parameters.clone(), ctx).await;
        let _ = tokio::fs::remove_dir_all(&work_dir).await;

        let end_ms = (self.now)();
        match outcome {
            Ok(()) => self.gateway.finish_ended(&instance.id, end_ms)?,
            Err(RunnerError::Cancelled) => self.gateway.finish_killed(&instance.id, end_ms, "killed")?,
            Err(RunnerError::Timeout) => self.gateway.finish_killed(&instance.id, end_ms, "timeout")?,
            Err(RunnerError::ArtifactUnavailable(reason)) => {
                self.gateway.finish_crashed(&instance.id, end_ms, reason)?;
            }
            Err(RunnerError::Payload(reason)) => {
                self.gateway.finish_crashed(&instance.id, end_ms, reason)?;
                if def.can_restart && instance.restart_count < def.max_restarts {
                    if let Err(e) = self.gateway.enqueue_restart(&instance, end_ms) {
                        tracing::warn!(instance = %instance.id, error = %e, "restart chain could not be continued");
                    }
                }
            }
            Err(RunnerError::Gateway(e)) => return Err(e.into()),
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
