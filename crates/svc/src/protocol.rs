// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request / response types for the resource-manager service.
//!
//! This is the wire-shaped surface: plain serde data, no live handles.
//! The transport that carries it (and leader election in front of it)
//! lives outside this crate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use muster_core::{
    AttemptId, Gang, JobId, Placement, PoolId, QueueKind, StatusEvent, Task, TaskId, TaskState,
    TaskType,
};
use muster_engine::PreemptionCandidate;

/// Structured error for the whole service surface.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SvcError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExist(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<muster_engine::Error> for SvcError {
    fn from(err: muster_engine::Error) -> Self {
        use muster_engine::Error as E;
        match err {
            E::TaskNotFound(id) => SvcError::NotFound(format!("task {id}")),
            E::PoolNotFound(id) => SvcError::NotFound(format!("resource pool {id}")),
            E::TaskAlreadyExists(id) | E::AttemptAlreadyExists(id) => {
                SvcError::AlreadyExist(format!("task {id}"))
            }
            E::InvalidTransition(e) => SvcError::InvalidArgument(e.to_string()),
            E::NotLeaf(id) => {
                SvcError::InvalidArgument(format!("resource pool {id} is not a leaf"))
            }
            E::QueueFull(name) => SvcError::OutOfRange(format!("queue {name} is full")),
            E::BackoffDisabled => SvcError::Internal("placement backoff is disabled".into()),
            E::InvalidArgument(msg) => SvcError::InvalidArgument(msg),
            E::Internal(msg) => SvcError::Internal(msg),
        }
    }
}

/// Why a task in a gang was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    AlreadyExist,
    Internal,
    FailedDueToGangFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTask {
    pub task_id: TaskId,
    pub message: String,
    pub code: FailureCode,
}

/// With `pool` set, the gangs are new submissions; with `pool` empty,
/// they are returning unplaced from a placement engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueGangsRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolId>,
    pub gangs: Vec<Gang>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueGangsResponse {
    pub failed: Vec<FailedTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DequeueGangsRequest {
    pub limit: usize,
    pub timeout_ms: u64,
    pub task_type: TaskType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DequeueGangsResponse {
    pub gangs: Vec<Gang>,
}

/// A gang a placement engine gave up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnplacedGang {
    pub gang: Gang,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPlacementsRequest {
    pub placements: Vec<Placement>,
    #[serde(default)]
    pub failed: Vec<UnplacedGang>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPlacement {
    pub placement: Placement,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetPlacementsResponse {
    pub failed: Vec<FailedPlacement>,
    /// Per-task failures from unplaced-gang processing.
    pub failed_tasks: Vec<FailedTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPlacementsRequest {
    pub limit: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetPlacementsResponse {
    pub placements: Vec<Placement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyTaskUpdatesRequest {
    pub events: Vec<StatusEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyTaskUpdatesResponse {
    /// Offsets at or below this are safe to purge upstream.
    pub purge_offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillTasksRequest {
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KillTasksResponse {
    pub not_found: Vec<TaskId>,
    pub not_killed: Vec<TaskId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPreemptibleTasksRequest {
    pub limit: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetPreemptibleTasksResponse {
    pub candidates: Vec<PreemptionCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPendingTasksRequest {
    pub pool: PoolId,
    pub limit: usize,
}

/// Tasks grouped by gang, since the gang is the admission unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingGang {
    pub task_ids: Vec<TaskId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetPendingTasksResponse {
    pub by_queue: HashMap<QueueKind, Vec<PendingGang>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskStateEntry {
    pub task_id: TaskId,
    pub attempt: AttemptId,
    pub state: TaskState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTasksStateRequest {
    pub entries: Vec<UpdateTaskStateEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTasksByHostsRequest {
    pub hostnames: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTasksByHostsResponse {
    pub host_tasks: HashMap<String, Vec<Task>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetActiveTasksRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolId>,
    #[serde(default)]
    pub states: Vec<TaskState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub task_id: TaskId,
    pub state: TaskState,
    pub reason: String,
    pub last_update_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetActiveTasksResponse {
    pub by_state: HashMap<TaskState, Vec<TaskEntry>>,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
