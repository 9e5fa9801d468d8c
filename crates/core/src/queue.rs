// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queue: a named FIFO with priority tiebreakers.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a queue.
    pub struct QueueId("jque-");
}

/// A named buffer of submitted instances with priority ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: QueueId,
    pub name: String,
    pub description: String,
    pub default_priority: i32,
    /// 0 means unbounded.
    pub max_size: u32,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: QueueId::new(),
            name: name.into(),
            description: String::new(),
            default_priority: 0,
            max_size: 0,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_size == 0
    }
}

crate::builder! {
    pub struct QueueBuilder => Queue {
        into {
            name: String = "test-queue",
            description: String = "",
        }
        set {
            default_priority: i32 = 0,
            max_size: u32 = 0,
        }
        computed {
            id: QueueId = QueueId::new(),
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
