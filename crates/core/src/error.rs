// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the engine.
//!
//! These are the kinds named in the engine's error-handling design: some are
//! surfaced to callers, some (`StateConflict`) are purely internal and must
//! never leak past the gateway boundary.

use thiserror::Error;

/// Errors raised by the Persistence Gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Enqueue rejected because the target queue is at `max_size`.
    #[error("queue '{queue}' is full (max_size={max_size})")]
    QueueFull { queue: String, max_size: u32 },

    /// Referenced id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic CAS on instance state failed. Internal only: callers that
    /// lose a race must not perform the transition's side effects, but this
    /// error must never leak out of the gateway to a client.
    #[error("state conflict: expected {expected}, observed {observed}")]
    StateConflict { expected: String, observed: String },

    /// The backing store (WAL/snapshot) is transiently unavailable. Callers
    /// retry with exponential backoff; only surfaced to clients after a
    /// configured deadline.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::BackendUnavailable(_))
    }
}

/// Errors surfaced from one Runner's execution of a single instance.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// The deployable artifact could not be loaded. Results in `CRASHED`
    /// without restart — this is a configuration error, not a payload error.
    #[error("artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    /// The payload raised an error. Results in `CRASHED`, possibly
    /// restarted per `JobDefinition::can_restart`.
    #[error("payload error: {0}")]
    Payload(String),

    /// The instance was cancelled before completing (observed at a yield
    /// point). Results in `KILLED`.
    #[error("cancelled")]
    Cancelled,

    /// The instance exceeded its configured deadline. Results in `KILLED`
    /// with reason "timeout".
    #[error("timeout")]
    Timeout,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
