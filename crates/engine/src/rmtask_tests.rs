// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{fixture, task};
use muster_core::{QueueKind, Resources, TaskType};
use std::time::Duration;

fn to_state(rm_task: &Arc<RmTask>, states: &[TaskState]) {
    for &state in states {
        rm_task
            .transit_to(state, TransitOptions::default())
            .unwrap();
    }
}

#[test]
fn transitions_update_counters_and_reason() {
    let fx = fixture();
    let pool = fx.pool("p1");
    let rm_task = fx.tracker.add_task(task("j", 0, 1.0, 100.0), pool).unwrap();

    assert_eq!(fx.tracker.counters().get(TaskState::Initialized), 1);
    rm_task
        .transit_to(
            TaskState::Pending,
            TransitOptions::with_reason("gang enqueued"),
        )
        .unwrap();
    assert_eq!(fx.tracker.counters().get(TaskState::Initialized), 0);
    assert_eq!(fx.tracker.counters().get(TaskState::Pending), 1);
    assert_eq!(rm_task.reason(), "gang enqueued");
}

#[test]
fn invalid_transition_is_rejected_without_effect() {
    let fx = fixture();
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 1.0, 100.0), fx.pool("p1"))
        .unwrap();

    let err = rm_task
        .transit_to(TaskState::Placed, TransitOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));
    assert_eq!(rm_task.current_state(), TaskState::Initialized);
}

#[test]
fn recovery_transitions_are_gated() {
    let fx = fixture();
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 1.0, 100.0), fx.pool("p1"))
        .unwrap();

    // Steady state: the recovery edge is closed.
    let err = rm_task
        .transit_to(TaskState::Running, TransitOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));

    // Recovery mode opens it.
    fx.tracker.set_recovery(true);
    let rm_task2 = fx
        .tracker
        .add_task(task("j", 1, 1.0, 100.0), fx.pool("p1"))
        .unwrap();
    rm_task2
        .transit_to(TaskState::Running, TransitOptions::default())
        .unwrap();
    assert_eq!(rm_task2.current_state(), TaskState::Running);
}

#[test]
fn start_time_is_set_exactly_once() {
    let fx = fixture();
    fx.tracker.set_recovery(true);
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 1.0, 100.0), fx.pool("p1"))
        .unwrap();

    to_state(&rm_task, &[TaskState::Running]);
    let first = rm_task.stats().start_time.unwrap();

    // Bounce through READY and back to RUNNING; the stamp must not move.
    fx.clock.advance(Duration::from_secs(5));
    to_state(
        &rm_task,
        &[TaskState::Ready, TaskState::Placing, TaskState::Placed, TaskState::Launching,
          TaskState::Running],
    );
    assert_eq!(rm_task.stats().start_time.unwrap(), first);
}

#[test]
fn add_backoff_bumps_retry_and_stretches_timeout() {
    let fx = fixture();
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 1.0, 100.0), fx.pool("p1"))
        .unwrap();

    rm_task.add_backoff().unwrap();
    rm_task.add_backoff().unwrap();
    let snapshot = rm_task.task();
    assert_eq!(snapshot.placement_retry_count, 2);
    // Zero backoff step in the fixture: timeout stays at the base.
    assert_eq!(snapshot.placement_timeout_ms, 1_000);
    assert!(!rm_task.is_failed_enough_placement());

    rm_task.add_backoff().unwrap();
    assert!(rm_task.is_failed_enough_placement(), "cycle of 3 completed");
}

#[test]
fn placing_timeout_returns_to_ready_and_requeues() {
    let fx = fixture();
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 2.0, 200.0), fx.pool("p1"))
        .unwrap();
    to_state(&rm_task, &[TaskState::Pending, TaskState::Ready]);
    rm_task.add_backoff().unwrap();
    to_state(&rm_task, &[TaskState::Placing]);

    fx.clock.advance(Duration::from_millis(1_001));
    let fired = rm_task.fire_due_timeout().unwrap().unwrap();
    assert_eq!((fired.from, fired.to), (TaskState::Placing, TaskState::Ready));
    assert_eq!(rm_task.placement_retry_count(), 1);
    assert_eq!(fx.ready.len(TaskType::Batch), 1, "gang re-enqueued for placement");
}

#[test]
fn placing_timeout_at_cycle_end_readmits() {
    let fx = fixture();
    let pool = fx.pool("p1");
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 2.0, 200.0), pool.clone())
        .unwrap();
    to_state(&rm_task, &[TaskState::Pending, TaskState::Ready]);
    // Simulate the admission charge the scheduler would have made.
    pool.add_to_allocation(Resources::cpu_mem(2.0, 200.0), QueueKind::Pending, false);

    for _ in 0..3 {
        rm_task.add_backoff().unwrap();
    }
    to_state(&rm_task, &[TaskState::Placing]);

    fx.clock.advance(Duration::from_millis(1_001));
    let fired = rm_task.fire_due_timeout().unwrap().unwrap();
    assert_eq!((fired.from, fired.to), (TaskState::Placing, TaskState::Pending));

    // Allocation flowed back to demand and the gang is queued again.
    assert!(pool.allocation().total.is_zero());
    assert_eq!(pool.demand(), Resources::cpu_mem(2.0, 200.0));
    assert_eq!(pool.queue_len(QueueKind::Pending), 1);
    assert_eq!(fx.ready.len(TaskType::Batch), 0);
}

#[test]
fn launching_timeout_returns_to_ready() {
    let fx = fixture();
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 1.0, 100.0), fx.pool("p1"))
        .unwrap();
    to_state(
        &rm_task,
        &[TaskState::Pending, TaskState::Ready, TaskState::Placing, TaskState::Placed,
          TaskState::Launching],
    );

    fx.clock.advance(Duration::from_millis(2_001));
    let fired = rm_task.fire_due_timeout().unwrap().unwrap();
    assert_eq!((fired.from, fired.to), (TaskState::Launching, TaskState::Ready));
    assert_eq!(fx.ready.len(TaskType::Batch), 1);
}

#[test]
fn timeout_not_due_is_a_noop() {
    let fx = fixture();
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 1.0, 100.0), fx.pool("p1"))
        .unwrap();
    to_state(&rm_task, &[TaskState::Pending, TaskState::Ready, TaskState::Placing]);

    fx.clock.advance(Duration::from_millis(500));
    assert!(rm_task.fire_due_timeout().unwrap().is_none());
    assert_eq!(rm_task.current_state(), TaskState::Placing);
}

#[test]
fn reset_placement_cycle_clears_retries() {
    let fx = fixture();
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 1.0, 100.0), fx.pool("p1"))
        .unwrap();
    for _ in 0..3 {
        rm_task.add_backoff().unwrap();
    }
    assert!(rm_task.is_failed_enough_placement());

    rm_task.reset_placement_cycle();
    assert_eq!(rm_task.placement_retry_count(), 0);
    assert!(!rm_task.is_failed_enough_placement());
}

#[test]
fn backoff_disabled_has_no_policy() {
    let mut config = crate::test_helpers::test_config();
    config.enable_placement_backoff = false;
    let fx = crate::test_helpers::fixture_with_config(config);
    let rm_task = fx
        .tracker
        .add_task(task("j", 0, 1.0, 100.0), fx.pool("p1"))
        .unwrap();

    assert!(matches!(rm_task.add_backoff(), Err(Error::BackoffDisabled)));
    assert!(!rm_task.is_failed_enough_placement());
}
