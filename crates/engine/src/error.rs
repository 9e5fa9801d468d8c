// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Errors local to the dispatch layer. Per-instance execution failures are
//! [`jqm_core::RunnerError`]; this crate only adds the admission-layer
//! taxonomy that sits above it.

use thiserror::Error;

/// Why the [`crate::Dispatcher`] declined a non-blocking admission.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The deployment is draining for shutdown; no new admissions accepted.
    #[error("dispatcher is draining")]
    Draining,
    /// All `maxConcurrent` permits are currently in flight.
    #[error("no free capacity")]
    NoCapacity,
}
