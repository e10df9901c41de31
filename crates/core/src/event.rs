// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status events flowing from the execution layer back into the manager.

use serde::{Deserialize, Serialize};

use crate::id::{AttemptId, TaskId};
use crate::state::TaskState;

/// A task status update with a monotonic stream offset.
///
/// Events for one instance are applied in offset order; the processor's
/// progress over offsets is the purge watermark for the upstream stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub offset: u64,
    pub task_id: TaskId,
    /// Instance index; the bucket shard key.
    pub instance: u32,
    /// Attempt the report belongs to; mismatches are stale and dropped.
    pub attempt: AttemptId,
    pub state: TaskState,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl StatusEvent {
    pub fn new(
        offset: u64,
        task_id: impl Into<TaskId>,
        instance: u32,
        attempt: impl Into<AttemptId>,
        state: TaskState,
    ) -> Self {
        Self {
            offset,
            task_id: task_id.into(),
            instance,
            attempt: attempt.into(),
            state,
            message: String::new(),
            hostname: None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
