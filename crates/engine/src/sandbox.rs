// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The invocation boundary between the Runner and a payload. `prepare`
//! resolves/validates the artifact before the instance ever reaches
//! `RUNNING`; `execute` drives the entry point with the materialized
//! parameters and the [`JobContext`] capability object.

use crate::context::JobContext;
use async_trait::async_trait;
use jqm_core::{JobDefinition, RunnerError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

/// One node's invocation strategy. `ProcessSandbox` is what a real
/// deployment uses; `InlineSandbox` runs a Rust closure in-process, which
/// is how this crate's own tests and the end-to-end scenarios in the
/// workspace root drive the engine without shelling out to a real
/// artifact.
#[async_trait]
pub trait Sandbox: Send + Sync + 'static {
    /// Resolve the artifact named by `def`. A failure here keeps the
    /// instance out of `RUNNING` entirely and never counts against
    /// `max_restarts` — it's a configuration error, not a payload failure.
    async fn prepare(&self, def: &JobDefinition) -> Result<(), RunnerError>;

    /// Invoke the entry point. Implementations drive `ctx` to emit
    /// messages/progress/deliverables and must honor `ctx.yield_now()`'s
    /// `Cancelled` result promptly.
    async fn execute(
        &self,
        def: &JobDefinition,
        params: HashMap<String, String>,
        ctx: Arc<JobContext>,
    ) -> Result<(), RunnerError>;
}

/// A payload implemented as a plain async Rust function, registered by
/// `entry_point_class`. Used by [`InlineSandbox`].
#[async_trait]
pub trait Payload: Send + Sync {
    async fn run(&self, params: HashMap<String, String>, ctx: Arc<JobContext>) -> Result<(), RunnerError>;
}

/// Runs registered [`Payload`]s in-process. No subprocess, no artifact
/// file — built for tests and for embedding the engine in a single binary.
#[derive(Default)]
pub struct InlineSandbox {
    payloads: HashMap<String, Arc<dyn Payload>>,
}

impl InlineSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry_point_class: impl Into<String>, payload: Arc<dyn Payload>) {
        self.payloads.insert(entry_point_class.into(), payload);
    }
}

#[async_trait]
impl Sandbox for InlineSandbox {
    async fn prepare(&self, def: &JobDefinition) -> Result<(), RunnerError> {
        if self.payloads.contains_key(&def.entry_point_class) {
            Ok(())
        } else {
            Err(RunnerError::ArtifactUnavailable(format!(
                "no inline payload registered for entry point '{}'",
                def.entry_point_class
            )))
        }
    }

    async fn execute(
        &self,
        def: &JobDefinition,
        params: HashMap<String, String>,
        ctx: Arc<JobContext>,
    ) -> Result<(), RunnerError> {
        let payload = self.payloads.get(&def.entry_point_class).cloned().ok_or_else(|| {
            RunnerError::ArtifactUnavailable(format!(
                "no inline payload registered for entry point '{}'",
                def.entry_point_class
            ))
        })?;
        payload.run(params, ctx).await
    }
}

/// Runs the artifact as a child process. Parameters are passed as
/// `JQM_PARAM_<UPPER_KEY>` environment variables; stdout/stderr are
/// captured to the instance's work directory and registered as
/// deliverables once the process exits.
pub struct ProcessSandbox {
    /// How often to poll `ctx.yield_now()` for a pending kill while the
    /// child is running.
    poll_interval: Duration,
}

impl ProcessSandbox {
    pub fn new() -> Self {
        Self { poll_interval: Duration::from_millis(200) }
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

fn artifact_local_path(def: &JobDefinition) -> PathBuf {
    PathBuf::from(def.artifact_path.strip_prefix("file://").unwrap_or(&def.artifact_path))
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn prepare(&self, def: &JobDefinition) -> Result<(), RunnerError> {
        let path = artifact_local_path(def);
        if !path.exists() {
            return Err(RunnerError::ArtifactUnavailable(format!("artifact not found: {}", path.display())));
        }
        Ok(())
    }

    async fn execute(
        &self,
        def: &JobDefinition,
        params: HashMap<String, String>,
        ctx: Arc<JobContext>,
    ) -> Result<(), RunnerError> {
        let path = artifact_local_path(def);
        let mut cmd = tokio::process::Command::new(&path);
        cmd.env_clear();
        cmd.envs(params.iter().map(|(k, v)| (format!("JQM_PARAM_{}", k.to_uppercase()), v.clone())));
        cmd.current_dir(ctx.work_dir());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| RunnerError::ArtifactUnavailable(e.to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Payload("child process has no stdout pipe".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Payload("child process has no stderr pipe".into()))?;

        let stdout_path = ctx.work_dir().join("stdout.log");
        let stderr_path = ctx.work_dir().join("stderr.log");
        let mut stdout_file = tokio::fs::File::create(&stdout_path)
            .await
            .map_err(|e| RunnerError::Payload(format!("opening stdout.log: {e}")))?;
        let mut stderr_file = tokio::fs::File::create(&stderr_path)
            .await
            .map_err(|e| RunnerError::Payload(format!("opening stderr.log: {e}")))?;

        // Copy each pipe on its own task so a slow/silent stream doesn't
        // starve the other, and so we can await both to EOF after the
        // child exits without re-polling a half-drained `io::copy`.
        let stdout_task = tokio::spawn(async move { tokio::io::copy(&mut stdout, &mut stdout_file).await });
        let stderr_task = tokio::spawn(async move { tokio::io::copy(&mut stderr, &mut stderr_file).await });

        let status = loop {
            tokio::select! {
                status = child.wait() => break status.map_err(|e| RunnerError::Payload(e.to_string()))?,
                _ = tokio::time::sleep(self.poll_interval) => {
                    if let Err(RunnerError::Cancelled) = ctx.yield_now().await {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        let _ = stdout_task.await;
                        let _ = stderr_task.await;
                        return Err(RunnerError::Cancelled);
                    }
                }
            }
        };
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        ctx.add_deliverable(&stdout_path, "stdout").await?;
        ctx.add_deliverable(&stderr_path, "stderr").await?;

        if status.success() {
            Ok(())
        } else {
            Err(RunnerError::Payload(format!("process exited with {:?}", status.code())))
        }
    }
}
