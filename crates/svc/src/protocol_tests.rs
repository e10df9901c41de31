// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use muster_core::Resources;
use yare::parameterized;

#[test]
fn enqueue_request_round_trips_without_pool() {
    let gang = Gang::single(Task::new("j", 0, Resources::cpu_mem(1.0, 128.0)));
    let req = EnqueueGangsRequest {
        pool: None,
        gangs: vec![gang],
        reason: "unplaced".to_string(),
    };
    let json = serde_json::to_string(&req).unwrap();
    assert!(!json.contains("\"pool\""), "empty pool is omitted");
    let back: EnqueueGangsRequest = serde_json::from_str(&json).unwrap();
    assert!(back.pool.is_none());
    assert_eq!(back.gangs.len(), 1);
}

#[test]
fn failure_codes_use_screaming_case() {
    let failed = FailedTask {
        task_id: TaskId::new("j-0"),
        message: "dup".to_string(),
        code: FailureCode::FailedDueToGangFailed,
    };
    let json = serde_json::to_string(&failed).unwrap();
    assert!(json.contains("FAILED_DUE_TO_GANG_FAILED"));
}

#[test]
fn pending_tasks_response_keys_by_queue_kind() {
    let mut by_queue = HashMap::new();
    by_queue.insert(
        QueueKind::Controller,
        vec![PendingGang {
            task_ids: vec![TaskId::new("j-0")],
        }],
    );
    let resp = GetPendingTasksResponse { by_queue };
    let json = serde_json::to_string(&resp).unwrap();
    assert!(json.contains("controller"));
    let back: GetPendingTasksResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(back.by_queue[&QueueKind::Controller].len(), 1);
}

#[parameterized(
    task_missing = { muster_engine::Error::TaskNotFound(TaskId::new("t")), "not found" },
    pool_missing = { muster_engine::Error::PoolNotFound(PoolId::new("p")), "not found" },
    duplicate = { muster_engine::Error::TaskAlreadyExists(TaskId::new("t")), "already exists" },
    not_leaf = { muster_engine::Error::NotLeaf(PoolId::new("p")), "invalid argument" },
    full = { muster_engine::Error::QueueFull("ready".into()), "out of range" },
    internal = { muster_engine::Error::Internal("x".into()), "internal" },
)]
fn engine_errors_map_to_structured_kinds(err: muster_engine::Error, prefix: &str) {
    let svc: SvcError = err.into();
    assert!(svc.to_string().starts_with(prefix), "got: {svc}");
}

#[test]
fn update_entry_round_trips() {
    let entry = UpdateTaskStateEntry {
        task_id: TaskId::new("j-0"),
        attempt: AttemptId::new("j-0-a1"),
        state: TaskState::Launched,
    };
    let json = serde_json::to_string(&entry).unwrap();
    let back: UpdateTaskStateEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(back.state, TaskState::Launched);
    assert_eq!(back.attempt, "j-0-a1");
}
