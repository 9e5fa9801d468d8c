// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! `JobContext`: the capability object handed to a running payload. Every
//! method is a yield point — it observes `pending_kill` before doing its
//! work and returns `RunnerError::Cancelled` if the instance was killed,
//! the same cooperative-cancellation contract the payload itself is asked
//! to honor at its own checkpoints.

use jqm_core::{InstanceId, JobDefId, QueueId, RunnerError, UserTags};
use jqm_storage::Gateway;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::EpochMillis;

/// Handed to [`crate::Sandbox::execute`] for the duration of one instance's
/// run. Cheap to clone; every clone shares the same underlying instance and
/// scratch directory.
pub struct JobContext {
    gateway: Arc<Gateway>,
    instance: InstanceId,
    work_dir: PathBuf,
    deliverable_root: PathBuf,
    now: EpochMillis,
    max_message_chars: usize,
}

impl JobContext {
    pub fn new(
        gateway: Arc<Gateway>,
        instance: InstanceId,
        work_dir: PathBuf,
        deliverable_root: PathBuf,
        now: EpochMillis,
        max_message_chars: usize,
    ) -> Self {
        Self { gateway, instance, work_dir, deliverable_root, now, max_message_chars }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// Per-instance scratch directory; removed by the Runner once the
    /// payload returns.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Cooperative cancellation checkpoint. Every other method calls this
    /// first; payloads doing long CPU-bound work between engine calls
    /// should call it directly too.
    pub async fn yield_now(&self) -> Result<(), RunnerError> {
        tokio::task::yield_now().await;
        let pending_kill =
            self.gateway.get_instance(&self.instance).map(|i| i.pending_kill).unwrap_or(false);
        if pending_kill {
            return Err(RunnerError::Cancelled);
        }
        Ok(())
    }

    pub async fn send_message(&self, text: impl Into<String>) -> Result<(), RunnerError> {
        self.yield_now().await?;
        let mut text = text.into();
        if text.chars().count() > self.max_message_chars {
            text = text.chars().take(self.max_message_chars).collect();
        }
        let now_ms = (self.now)();
        self.gateway.record_message(&self.instance, text, now_ms).map_err(RunnerError::from)
    }

    pub async fn send_progress(&self, percent: u8) -> Result<(), RunnerError> {
        self.yield_now().await?;
        self.gateway.update_progress(&self.instance, percent).map_err(RunnerError::from)
    }

    /// Move `src_path` into the deliverable repository, hash and fsync it,
    /// then record it. Moves across filesystem boundaries fall back to
    /// copy-then-remove since `rename(2)` isn't atomic across mount points
    /// (see DESIGN.md for why this crate doesn't try to make that step
    /// transactional with the WAL commit).
    pub async fn add_deliverable(
        &self,
        src_path: impl AsRef<Path>,
        label: impl Into<String>,
    ) -> Result<u64, RunnerError> {
        self.yield_now().await?;
        let src_path = src_path.as_ref();
        let label = label.into();

        let bytes = tokio::fs::read(src_path)
            .await
            .map_err(|e| RunnerError::Payload(format!("reading deliverable {}: {e}", src_path.display())))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = format!("{:x}", hasher.finalize());
        let size = bytes.len() as u64;

        let dest_dir = self.deliverable_root.join(self.instance.as_str());
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| RunnerError::Payload(format!("creating deliverable dir: {e}")))?;
        let file_name = src_path.file_name().and_then(|n| n.to_str()).unwrap_or("deliverable");
        let dest_path = unique_destination(&dest_dir, file_name).await;

        if tokio::fs::rename(src_path, &dest_path).await.is_err() {
            tokio::fs::copy(src_path, &dest_path)
                .await
                .map_err(|e| RunnerError::Payload(format!("copying deliverable: {e}")))?;
            let _ = tokio::fs::remove_file(src_path).await;
        }
        let file = tokio::fs::File::open(&dest_path)
            .await
            .map_err(|e| RunnerError::Payload(format!("reopening deliverable: {e}")))?;
        file.sync_all().await.map_err(|e| RunnerError::Payload(format!("fsyncing deliverable: {e}")))?;

        let now_ms = (self.now)();
        self.gateway
            .record_deliverable(&self.instance, dest_path.to_string_lossy(), label, hash, size, now_ms)
            .map_err(RunnerError::from)
    }

    /// Submit a child instance, parented to this one.
    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        job_definition: &JobDefId,
        queue_override: Option<QueueId>,
        priority_override: Option<i32>,
        parameters: HashMap<String, String>,
        user_tags: UserTags,
    ) -> Result<InstanceId, RunnerError> {
        self.yield_now().await?;
        let now_ms = (self.now)();
        self.gateway
            .enqueue(job_definition, queue_override, priority_override, parameters, user_tags, Some(self.instance), now_ms)
            .map_err(RunnerError::from)
    }
}

async fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if tokio::fs::metadata(&candidate).await.is_err() {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (file_name.to_string(), String::new()),
    };
    for n in 1..10_000u32 {
        let candidate = dir.join(format!("{stem}-{n}{ext}"));
        if tokio::fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
    }
    dir.join(file_name)
}
