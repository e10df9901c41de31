// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task descriptor: the unit of work submitted for admission.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{AttemptId, JobId, TaskId};
use crate::resources::Resources;

/// Workload class; the ready queue is segmented by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Batch,
    Stateless,
    Stateful,
    Daemon,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Batch,
        TaskType::Stateless,
        TaskType::Stateful,
        TaskType::Daemon,
    ];
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Batch => "batch",
            TaskType::Stateless => "stateless",
            TaskType::Stateful => "stateful",
            TaskType::Daemon => "daemon",
        };
        f.write_str(s)
    }
}

/// A task as submitted and tracked. The tracker's copy is canonical once
/// the task is admitted; copies inside queued gangs are snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    /// Instance index within the job; also the event-bucket shard key.
    pub instance: u32,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_true")]
    pub preemptible: bool,
    #[serde(default)]
    pub revocable: bool,
    /// Controller tasks bypass the standard pending queue subject to a
    /// pool-local cap.
    #[serde(default)]
    pub controller: bool,
    pub resource: Resources,
    /// Current launch-attempt identity; rotates on each launch attempt.
    pub attempt: AttemptId,
    /// Placement retries within the current admission cycle.
    #[serde(default)]
    pub placement_retry_count: u32,
    /// Effective placing timeout for the current attempt, recomputed by
    /// the backoff policy.
    #[serde(default)]
    pub placement_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Task {
    /// New batch task with default flags and a fresh attempt id.
    pub fn new(job_id: impl Into<JobId>, instance: u32, resource: Resources) -> Self {
        let job_id = job_id.into();
        let id = TaskId::for_instance(&job_id, instance);
        let attempt = AttemptId::generate(&id);
        Self {
            id,
            job_id,
            instance,
            task_type: TaskType::Batch,
            priority: 0,
            preemptible: true,
            revocable: false,
            controller: false,
            resource,
            attempt,
            placement_retry_count: 0,
            placement_timeout_ms: 0,
            hostname: None,
        }
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_preemptible(mut self, preemptible: bool) -> Self {
        self.preemptible = preemptible;
        self
    }

    pub fn with_revocable(mut self, revocable: bool) -> Self {
        self.revocable = revocable;
        self
    }

    pub fn with_controller(mut self, controller: bool) -> Self {
        self.controller = controller;
        self
    }

    /// Rotate the attempt id for a fresh launch attempt.
    pub fn rotate_attempt(&mut self) -> AttemptId {
        self.attempt = AttemptId::generate(&self.id);
        self.attempt.clone()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
