// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// All states a task can be in, from admission to termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Created, not yet admitted to a pool's pending queue.
    Initialized,
    /// In the pool pending queue awaiting admission.
    Pending,
    /// Admitted; in the ready queue awaiting a placement engine.
    Ready,
    /// Handed to a placement engine; bounded by the placing timeout.
    Placing,
    /// Placement received; in the placements queue.
    Placed,
    /// Handed to the job manager for launch; bounded by the launching timeout.
    Launching,
    /// Launch acknowledged, not yet reported running.
    Launched,
    Running,
    Succeeded,
    Failed,
    /// Kill requested, not yet confirmed.
    Killing,
    Killed,
    Lost,
    /// Selected for preemption, awaiting eviction.
    Preempting,
}

impl TaskState {
    pub const ALL: [TaskState; 14] = [
        TaskState::Initialized,
        TaskState::Pending,
        TaskState::Ready,
        TaskState::Placing,
        TaskState::Placed,
        TaskState::Launching,
        TaskState::Launched,
        TaskState::Running,
        TaskState::Succeeded,
        TaskState::Failed,
        TaskState::Killing,
        TaskState::Killed,
        TaskState::Lost,
        TaskState::Preempting,
    ];

    /// Terminal states remove the task from the manager.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Initialized => "INITIALIZED",
            TaskState::Pending => "PENDING",
            TaskState::Ready => "READY",
            TaskState::Placing => "PLACING",
            TaskState::Placed => "PLACED",
            TaskState::Launching => "LAUNCHING",
            TaskState::Launched => "LAUNCHED",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
            TaskState::Killing => "KILLING",
            TaskState::Killed => "KILLED",
            TaskState::Lost => "LOST",
            TaskState::Preempting => "PREEMPTING",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for TaskState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
