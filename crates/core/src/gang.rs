// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gang: an ordered, non-empty set of tasks admitted atomically.

use serde::{Deserialize, Serialize};

use crate::id::TaskId;
use crate::resources::Resources;
use crate::task::Task;

/// Which leaf-pool sub-queue a gang belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Pending,
    NonPreemptible,
    Controller,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [
        QueueKind::Pending,
        QueueKind::NonPreemptible,
        QueueKind::Controller,
    ];
}

impl Task {
    /// Admission category of a single task; gangs inherit the first
    /// member's category.
    pub fn queue_kind(&self) -> QueueKind {
        if self.controller {
            QueueKind::Controller
        } else if !self.preemptible {
            QueueKind::NonPreemptible
        } else {
            QueueKind::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GangError {
    #[error("a gang must contain at least one task")]
    Empty,
    #[error("all tasks in a gang must share preemptibility and controller flags")]
    MixedClass,
}

/// Atomic admission unit. All member tasks share one resource pool;
/// admission, requeue and failure apply to the gang as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gang {
    tasks: Vec<Task>,
}

impl Gang {
    /// Build a gang, rejecting empty or mixed-class task sets.
    pub fn new(tasks: Vec<Task>) -> Result<Self, GangError> {
        let first = tasks.first().ok_or(GangError::Empty)?;
        let (preemptible, controller) = (first.preemptible, first.controller);
        if tasks
            .iter()
            .any(|t| t.preemptible != preemptible || t.controller != controller)
        {
            return Err(GangError::MixedClass);
        }
        Ok(Self { tasks })
    }

    pub fn single(task: Task) -> Self {
        Self { tasks: vec![task] }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.iter().map(|t| &t.id)
    }

    /// Aggregate demand of the gang: component-wise sum of member demand.
    pub fn resources(&self) -> Resources {
        self.tasks
            .iter()
            .fold(Resources::ZERO, |acc, t| acc + t.resource)
    }

    /// Ordering key for the pending queue: the highest member priority.
    pub fn priority(&self) -> u32 {
        self.tasks.iter().map(|t| t.priority).max().unwrap_or(0)
    }

    /// Workload class of the gang (first member's tag).
    pub fn task_type(&self) -> crate::task::TaskType {
        self.tasks.first().map(|t| t.task_type).unwrap_or_default()
    }

    /// True if every member is revocable (admits against slack).
    pub fn revocable(&self) -> bool {
        self.tasks.iter().all(|t| t.revocable)
    }

    /// Sub-queue this gang is routed to on enqueue.
    pub fn queue_kind(&self) -> QueueKind {
        self.tasks
            .first()
            .map(Task::queue_kind)
            .unwrap_or(QueueKind::Pending)
    }

    /// Drop members not satisfying the predicate; used to shed tasks that
    /// have left the tracker while the gang sat in a queue.
    pub fn retain(&mut self, f: impl FnMut(&Task) -> bool) {
        self.tasks.retain(f);
    }
}

#[cfg(test)]
#[path = "gang_tests.rs"]
mod tests;
