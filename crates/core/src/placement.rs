// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Placement: a host chosen by a placement engine for a set of tasks.

use serde::{Deserialize, Serialize};

use crate::id::TaskId;
use crate::task::TaskType;

/// Emitted by a placement engine, queued once, dequeued once. Tasks that
/// leave the expected state while the placement is queued are dropped
/// from it at dequeue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub hostname: String,
    #[serde(default)]
    pub task_type: TaskType,
    pub tasks: Vec<TaskId>,
}

impl Placement {
    pub fn new(hostname: impl Into<String>, tasks: Vec<TaskId>) -> Self {
        Self {
            hostname: hostname.into(),
            task_type: TaskType::default(),
            tasks,
        }
    }

    /// Drop task ids not satisfying the predicate.
    pub fn retain(&mut self, f: impl FnMut(&TaskId) -> bool) {
        self.tasks.retain(f);
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
#[path = "placement_tests.rs"]
mod tests;
