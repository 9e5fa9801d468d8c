// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown: lock acquisition, WAL/snapshot recovery,
//! socket bind, and the periodic checkpoint task. One `DaemonState` per
//! process; `startup` either returns a fully wired one or cleans up
//! whatever it touched before the step that failed.

use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fs2::FileExt;
use jqm_core::{Node, NodeId};
use jqm_engine::{epoch_millis_from, ProcessSandbox, Supervisor};
use jqm_storage::{load_snapshot, Checkpointer, Gateway, MaterializedState};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::LifecycleError;

pub struct DaemonState {
    pub config: Config,
    #[allow(dead_code)]
    lock_file: File,
    pub gateway: Arc<Gateway>,
    pub supervisor: Arc<Supervisor<ProcessSandbox>>,
    pub start_time: Instant,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    checkpoint_handle: Option<tokio::task::JoinHandle<()>>,
}

/// Acquire the process lock, recover state from disk, register this node,
/// and bind the control socket. Nothing observable to other processes
/// (the socket, the lock) survives a failed startup. The bound listener is
/// returned alongside the state since it's moved into its own accept-loop
/// task rather than owned by `DaemonState`.
pub async fn startup(config: Config) -> Result<(DaemonState, UnixListener), LifecycleError> {
    match startup_inner(&config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            if !matches!(e, LifecycleError::LockFailed(..)) {
                cleanup_on_failure(&config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<(DaemonState, UnixListener), LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.repo_path)?;
    std::fs::create_dir_all(&config.tmp_path)?;
    std::fs::create_dir_all(&config.deliverable_root)?;
    if let Some(parent) = config.wal_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed(config.lock_path.clone(), e))?;
    lock_file.set_len(0)?;
    {
        use std::io::Write;
        let mut f = &lock_file;
        writeln!(f, "{}", std::process::id())?;
    }

    let (initial_state, processed_seq) = match load_snapshot(&config.snapshot_path)? {
        Some(snapshot) => {
            info!(seq = snapshot.seq, "loaded snapshot");
            (snapshot.state, snapshot.seq)
        }
        None => {
            info!("no snapshot found, starting from an empty state");
            (MaterializedState::default(), 0)
        }
    };

    let gateway = Arc::new(Gateway::open(&config.wal_path, processed_seq, initial_state)?);

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    let node_id = load_or_create_node_id(&config.state_dir)?;
    let node = Node {
        id: node_id,
        name: config.node_name.clone(),
        host: "localhost".to_string(),
        port: 0,
        repo_path: config.repo_path.clone(),
        tmp_path: config.tmp_path.clone(),
        enabled: true,
    };
    gateway.register_node(node.clone())?;

    let registry = Arc::new(jqm_engine::DeploymentRegistry::new(gateway.clone()));
    let sandbox = Arc::new(ProcessSandbox::new());
    let now = epoch_millis_from(jqm_core::SystemClock);
    let supervisor = Arc::new(Supervisor::new(
        gateway.clone(),
        registry,
        node,
        sandbox,
        config.deliverable_root.clone(),
        config.tunables.max_message_chars,
        now,
        Duration::from_millis(config.tunables.drain_timeout_ms),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = DaemonState {
        config: config.clone(),
        lock_file,
        gateway,
        supervisor,
        start_time: Instant::now(),
        shutdown_tx,
        shutdown_rx,
        checkpoint_handle: None,
    };
    Ok((state, listener))
}

impl DaemonState {
    /// Spawn the supervisor's reconcile loop and a periodic checkpoint
    /// task; both stop when `shutdown()` fires.
    pub fn spawn_background_tasks(&mut self) -> tokio::task::JoinHandle<Result<(), jqm_core::GatewayError>> {
        let reconcile_interval = Duration::from_millis(self.config.tunables.reconcile_interval_ms);
        let supervisor = self.supervisor.clone();
        let shutdown_rx = self.shutdown_rx.clone();
        let supervisor_handle = tokio::spawn(async move { supervisor.run(reconcile_interval, shutdown_rx).await });

        let gateway = self.gateway.clone();
        let snapshot_path = self.config.snapshot_path.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        self.checkpoint_handle = Some(tokio::spawn(async move {
            let checkpointer = Checkpointer::new(snapshot_path);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {
                        let (state, seq) = gateway.checkpoint_view();
                        let now_ms = jqm_core::Clock::epoch_ms(&jqm_core::SystemClock);
                        if let Err(e) = checkpointer.checkpoint(&state, seq, now_ms) {
                            warn!(error = %e, "periodic checkpoint failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        }));

        supervisor_handle
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Flush a final checkpoint, remove the socket, and return — the lock
    /// file releases its exclusive lock when `self` drops.
    pub async fn shutdown(mut self) {
        info!("shutting down");
        self.request_shutdown();
        if let Some(handle) = self.checkpoint_handle.take() {
            let _ = handle.await;
        }

        let (state, seq) = self.gateway.checkpoint_view();
        let checkpointer = Checkpointer::new(&self.config.snapshot_path);
        let now_ms = jqm_core::Clock::epoch_ms(&jqm_core::SystemClock);
        if let Err(e) = checkpointer.checkpoint(&state, seq, now_ms) {
            warn!(error = %e, "final checkpoint failed");
        }

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove lock file");
            }
        }
        info!("shutdown complete");
    }
}

fn cleanup_on_failure(config: &Config) {
    let _ = std::fs::remove_file(&config.socket_path);
}

/// A node's identity must survive restarts so boot-time `recover_crashed`
/// matches the instances this same node attributed to itself before an
/// unclean shutdown. Persisted once at `<state_dir>/node_id`.
fn load_or_create_node_id(state_dir: &std::path::Path) -> Result<NodeId, LifecycleError> {
    let path = state_dir.join("node_id");
    if let Ok(text) = std::fs::read_to_string(&path) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return Ok(NodeId::from_string(trimmed));
        }
    }
    let id = NodeId::new();
    std::fs::write(&path, id.as_str())?;
    Ok(id)
}
