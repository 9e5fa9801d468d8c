// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! jqm-daemon: the Engine Supervisor (C9) wrapped in a process. Boots by
//! acquiring an exclusive lock, recovering `MaterializedState` from the
//! last snapshot plus WAL tail, running crash recovery for this node, and
//! then serving `jqm-wire` requests over a Unix domain socket while the
//! `Supervisor` drives `Poller`/`Dispatcher` pairs for every enabled
//! deployment binding.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod listener;

pub use config::Config;
pub use error::LifecycleError;

use std::sync::Arc;

/// Run the daemon to completion: boot, serve, and shut down cleanly on
/// ctrl-c or a `Request::Shutdown` over the control socket.
pub async fn run(config: Config) -> Result<(), LifecycleError> {
    let (mut state, socket) = lifecycle::startup(config).await?;

    let node_name = state.config.node_name.clone();
    let start_time = state.start_time;
    let supervisor_handle = state.spawn_background_tasks();

    let (listen_shutdown_tx, listen_shutdown_rx) = tokio::sync::watch::channel(false);
    let ctx = Arc::new(listener::ListenCtx {
        gateway: state.gateway.clone(),
        supervisor: state.supervisor.clone(),
        start_time,
        node_name,
        shutdown_tx: listen_shutdown_tx,
    });

    let mut shutdown_watch = ctx.shutdown_tx.subscribe();
    let listener_handle = tokio::spawn(listener::run(socket, ctx, listen_shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
        _ = shutdown_watch.changed() => {
            tracing::info!("received shutdown request, shutting down");
        }
    }

    state.request_shutdown();
    let _ = supervisor_handle.await;
    listener_handle.abort();
    state.shutdown().await;
    Ok(())
}
