// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker Pool / Dispatcher (C5): bounds how many Runners a
//! `DeploymentBinding` may have in flight at once. Admission is a single
//! non-blocking `try_acquire` against a semaphore sized to
//! `maxConcurrent` — the Poller is expected to only reserve as many
//! instances as `free_slots()` reports, but `try_admit` is the hard limit
//! either way.

use crate::error::DispatchError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct Dispatcher {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    draining: AtomicBool,
    tasks: parking_lot::Mutex<JoinSet<()>>,
}

impl Dispatcher {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            draining: AtomicBool::new(false),
            tasks: parking_lot::Mutex::new(JoinSet::new()),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits not currently held by an in-flight Runner. The Poller
    /// should never reserve more instances than this reports.
    pub fn free_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Non-blocking admission: if a permit and capacity are both
    /// available, spawn `task` holding that permit (released on
    /// completion) and return `Ok(())`. Otherwise the caller must requeue
    /// whatever instance it was about to hand off.
    pub fn try_admit<F, Fut>(&self, task: F) -> Result<(), DispatchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.draining.load(Ordering::Acquire) {
            return Err(DispatchError::Draining);
        }
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().map_err(|_| DispatchError::NoCapacity)?;
        let fut = task();
        self.tasks.lock().spawn(async move {
            let _permit = permit;
            fut.await;
        });
        Ok(())
    }

    /// Stop accepting new admissions and wait for in-flight Runners to
    /// finish, up to `deadline`. Runners still running past the deadline
    /// are aborted — they are expected to observe `ctx.yield_now()` well
    /// before that and exit on their own.
    pub async fn drain(&self, deadline: Duration) {
        self.draining.store(true, Ordering::Release);
        let mut tasks = std::mem::replace(&mut *self.tasks.lock(), JoinSet::new());

        let sleep = tokio::time::sleep(deadline);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                _ = &mut sleep => {
                    tracing::warn!(remaining = tasks.len(), "drain deadline exceeded; aborting remaining runners");
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
            }
        }
    }
}
