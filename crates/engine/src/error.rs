// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine.

use muster_core::{PoolId, StateMachineError, TaskId, TaskState};
use thiserror::Error;

/// Errors surfaced by trackers, pools and queues.
#[derive(Debug, Error)]
pub enum Error {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("resource pool not found: {0}")]
    PoolNotFound(PoolId),
    #[error("task already exists in the tracker: {0}")]
    TaskAlreadyExists(TaskId),
    #[error("task {0} already enqueued with the same attempt")]
    AttemptAlreadyExists(TaskId),
    #[error(transparent)]
    InvalidTransition(#[from] StateMachineError<TaskState>),
    #[error("resource pool {0} is not a leaf")]
    NotLeaf(PoolId),
    #[error("queue {0} is full")]
    QueueFull(String),
    #[error("placement backoff is disabled")]
    BackoffDisabled,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal: {0}")]
    Internal(String),
}
