// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{fixture, fixture_with_config, task, test_config};
use muster_core::{QueueKind, Resources, TaskId};
use std::time::Duration as StdDuration;

fn scheduler(fx: &crate::test_helpers::Fixture) -> Arc<Scheduler> {
    Scheduler::new(
        Arc::clone(&fx.tree),
        Arc::clone(&fx.tracker),
        Arc::clone(&fx.ready),
        Arc::clone(&fx.config),
    )
}

/// Enqueue a pending gang the way the handler does: tracker add, PENDING
/// transition, pool enqueue.
fn enqueue_pending(
    fx: &crate::test_helpers::Fixture,
    pool: &Arc<ResPool>,
    tasks: Vec<muster_core::Task>,
) -> Gang {
    let mut members = Vec::new();
    for t in tasks {
        let rm_task = fx.tracker.add_task(t, Arc::clone(pool)).unwrap();
        rm_task
            .transit_to(TaskState::Pending, TransitOptions::default())
            .unwrap();
        members.push(rm_task.task());
    }
    let gang = Gang::new(members).unwrap();
    pool.enqueue_gang(gang.clone()).unwrap();
    gang
}

#[tokio::test]
async fn admission_promotes_pending_gangs_to_ready() {
    let fx = fixture();
    let pool = fx.pool("p1");
    enqueue_pending(&fx, &pool, vec![task("j", 0, 2.0, 200.0)]);

    let promoted = scheduler(&fx).schedule_once();
    assert_eq!(promoted, 1);

    assert!(pool.demand().is_zero());
    assert_eq!(pool.allocation().total, Resources::cpu_mem(2.0, 200.0));
    let rm_task = fx.tracker.get_task(&TaskId::new("j-0")).unwrap();
    assert_eq!(rm_task.current_state(), TaskState::Ready);

    let gang = fx
        .ready
        .dequeue(TaskType::Batch, StdDuration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(gang.len(), 1);
}

#[tokio::test]
async fn admission_is_all_or_none_per_gang() {
    let fx = fixture();
    let pool = fx.pool("p1");
    enqueue_pending(
        &fx,
        &pool,
        vec![task("j", 0, 2.0, 200.0), task("j", 1, 2.0, 200.0)],
    );

    let promoted = scheduler(&fx).schedule_once();
    assert_eq!(promoted, 2, "both gang members admitted together");
    assert_eq!(pool.allocation().total, Resources::cpu_mem(4.0, 400.0));
    let gang = fx
        .ready
        .dequeue(TaskType::Batch, StdDuration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(gang.len(), 2);
}

#[tokio::test]
async fn gang_too_big_for_entitlement_stays_pending() {
    let fx = fixture();
    let pool = fx.pool("p1");
    enqueue_pending(&fx, &pool, vec![task("j", 0, 20.0, 200.0)]);

    assert_eq!(scheduler(&fx).schedule_once(), 0);
    assert_eq!(pool.demand(), Resources::cpu_mem(20.0, 200.0));
    assert_eq!(pool.queue_len(QueueKind::Pending), 1);
    let rm_task = fx.tracker.get_task(&TaskId::new("j-0")).unwrap();
    assert_eq!(rm_task.current_state(), TaskState::Pending);
}

#[tokio::test]
async fn deleted_tasks_are_shed_at_admission() {
    let fx = fixture();
    let pool = fx.pool("p1");
    enqueue_pending(
        &fx,
        &pool,
        vec![task("j", 0, 2.0, 200.0), task("j", 1, 2.0, 200.0)],
    );
    // j-0 is killed while the gang waits; its demand is released there.
    let rm_task = fx.tracker.get_task(&TaskId::new("j-0")).unwrap();
    fx.tracker
        .mark_it_done(&rm_task.id(), &rm_task.attempt())
        .unwrap();

    let promoted = scheduler(&fx).schedule_once();
    assert_eq!(promoted, 1);
    assert_eq!(pool.allocation().total, Resources::cpu_mem(2.0, 200.0));
    let gang = fx
        .ready
        .dequeue(TaskType::Batch, StdDuration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(gang.len(), 1);
    assert_eq!(gang.tasks()[0].instance, 1);
}

#[tokio::test]
async fn full_ready_queue_rolls_the_gang_back() {
    let mut config = test_config();
    config.ready_queue_capacity = 1;
    let fx = fixture_with_config(config);
    let pool = fx.pool("p1");
    enqueue_pending(&fx, &pool, vec![task("a", 0, 1.0, 100.0)]);
    enqueue_pending(&fx, &pool, vec![task("b", 0, 1.0, 100.0)]);

    let promoted = scheduler(&fx).schedule_once();
    assert_eq!(promoted, 1, "second gang bounced off the full queue");

    // Rolled-back gang: PENDING again, demand restored, head of queue.
    let bounced = fx.tracker.get_task(&TaskId::new("b-0")).unwrap();
    assert_eq!(bounced.current_state(), TaskState::Pending);
    assert_eq!(pool.demand(), Resources::cpu_mem(1.0, 100.0));
    assert_eq!(pool.queue_len(QueueKind::Pending), 1);
    assert_eq!(pool.allocation().total, Resources::cpu_mem(1.0, 100.0));
}

#[tokio::test]
async fn run_loop_promotes_and_stops_on_shutdown() {
    let mut config = test_config();
    config.scheduling_period_ms = 10;
    let fx = fixture_with_config(config);
    let pool = fx.pool("p1");
    enqueue_pending(&fx, &pool, vec![task("j", 0, 1.0, 100.0)]);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(scheduler(&fx).run(shutdown_rx));

    let gang = fx
        .ready
        .dequeue(TaskType::Batch, StdDuration::from_secs(2))
        .await;
    assert!(gang.is_some(), "loop should admit the gang");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn ready_queue_segments_by_task_type() {
    let ready = ReadyQueue::new(10);
    let batch = Gang::single(task("j", 0, 1.0, 1.0));
    let svc = Gang::single(task("j", 1, 1.0, 1.0).with_type(TaskType::Stateless));
    ready.enqueue(batch).unwrap();
    ready.enqueue(svc).unwrap();

    assert_eq!(ready.len(TaskType::Batch), 1);
    assert_eq!(ready.len(TaskType::Stateless), 1);
    let got = ready
        .dequeue(TaskType::Stateless, StdDuration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(got.tasks()[0].instance, 1);
    assert!(ready
        .dequeue(TaskType::Daemon, StdDuration::from_millis(10))
        .await
        .is_none());
}
