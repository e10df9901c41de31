// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::{
    DequeueGangsRequest, EnqueueGangsRequest, GetPlacementsRequest, SetPlacementsRequest,
};
use muster_core::{Gang, PoolId, Resources, Task, TaskId, TaskType};

fn fast_config() -> RmConfig {
    RmConfig {
        placing_timeout_ms: 60_000,
        launching_timeout_ms: 60_000,
        scheduling_period_ms: 10,
        timeout_sweep_period_ms: 10,
        entitlement_period_ms: 50,
        preemption_period_ms: 50,
        event_buckets: 2,
        event_bucket_capacity: 100,
        ..RmConfig::default()
    }
}

fn pool_spec() -> PoolSpec {
    PoolSpec::new("root", Resources::cpu_mem(10.0, 10_240.0)).with_child(PoolSpec::new(
        "p1",
        Resources::cpu_mem(10.0, 10_240.0),
    ))
}

#[tokio::test]
async fn start_enqueue_place_and_stop() {
    let service = Service::start(fast_config(), &pool_spec()).await.unwrap();
    let handler = service.handler();

    let task = Task::new("job", 0, Resources::cpu_mem(1.0, 512.0));
    let resp = handler
        .enqueue_gangs(EnqueueGangsRequest {
            pool: Some(PoolId::new("p1")),
            gangs: vec![Gang::single(task)],
            reason: String::new(),
        })
        .await
        .unwrap();
    assert!(resp.failed.is_empty());

    // The admission loop promotes the gang; DequeueGangs hands it over.
    let resp = handler
        .dequeue_gangs(DequeueGangsRequest {
            limit: 1,
            timeout_ms: 2_000,
            task_type: TaskType::Batch,
        })
        .await
        .unwrap();
    assert_eq!(resp.gangs.len(), 1);

    let resp = handler
        .set_placements(SetPlacementsRequest {
            placements: vec![muster_core::Placement::new("h1", vec![TaskId::new("job-0")])],
            failed: vec![],
        })
        .await
        .unwrap();
    assert!(resp.failed.is_empty());

    let resp = handler
        .get_placements(GetPlacementsRequest {
            limit: 1,
            timeout_ms: 500,
        })
        .await
        .unwrap();
    assert_eq!(resp.placements.len(), 1);

    service.stop().await;
}

#[tokio::test]
async fn operations_refuse_after_stop() {
    let service = Service::start(fast_config(), &pool_spec()).await.unwrap();
    let handler = service.handler();
    service.stop().await;

    let err = handler
        .enqueue_gangs(EnqueueGangsRequest {
            pool: Some(PoolId::new("p1")),
            gangs: vec![],
            reason: String::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SvcError::Unavailable(_)));
}

#[tokio::test]
async fn invalid_config_refuses_to_start() {
    let config = RmConfig {
        event_buckets: 0,
        ..RmConfig::default()
    };
    let err = Service::start(config, &pool_spec()).await.unwrap_err();
    assert!(matches!(err, SvcError::InvalidArgument(_)));
}

#[tokio::test]
async fn duplicate_pool_spec_refuses_to_start() {
    let spec = PoolSpec::new("root", Resources::cpu_mem(1.0, 1.0))
        .with_child(PoolSpec::new("a", Resources::cpu_mem(1.0, 1.0)))
        .with_child(PoolSpec::new("a", Resources::cpu_mem(1.0, 1.0)));
    let err = Service::start(fast_config(), &spec).await.unwrap_err();
    assert!(matches!(err, SvcError::InvalidArgument(_)));
}
