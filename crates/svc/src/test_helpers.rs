// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for service tests.

use std::sync::Arc;

use muster_core::{
    FakeClock, Gang, NoopObserver, Placement, PoolId, PoolSpec, Resources, RmConfig, Task,
};
use muster_engine::{Preemptor, Queue, ReadyQueue, ResPool, Scheduler, Tracker, Tree};

use crate::events::EventProcessor;
use crate::handler::ServiceHandler;
use crate::status::StatusUpdateProcessor;

pub(crate) struct Fixture {
    pub clock: FakeClock,
    pub tree: Arc<Tree>,
    pub tracker: Arc<Tracker>,
    pub ready: Arc<ReadyQueue>,
    pub scheduler: Arc<Scheduler>,
    pub preemptor: Arc<Preemptor>,
    pub processor: Arc<EventProcessor>,
    pub handler: Arc<ServiceHandler>,
}

impl Fixture {
    pub fn pool(&self, id: &str) -> Arc<ResPool> {
        self.tree.get(&PoolId::new(id)).unwrap()
    }
}

pub(crate) fn test_config() -> RmConfig {
    RmConfig {
        placing_timeout_ms: 1_000,
        launching_timeout_ms: 2_000,
        enable_placement_backoff: true,
        placement_retry_backoff_ms: 0,
        max_placement_retries: 3,
        event_buckets: 4,
        event_bucket_capacity: 100,
        ..RmConfig::default()
    }
}

/// Handler over a one-leaf tree ("p1", 10 cpu / 10240 MiB), started, with
/// the event consumers NOT yet running so tests control draining.
pub(crate) fn fixture() -> Fixture {
    fixture_with_config(test_config())
}

pub(crate) fn fixture_with_config(config: RmConfig) -> Fixture {
    let clock = FakeClock::new();
    let config = Arc::new(config);
    let spec = PoolSpec::new("root", Resources::cpu_mem(10.0, 10_240.0)).with_child(
        PoolSpec::new("p1", Resources::cpu_mem(10.0, 10_240.0))
            .with_reservation(Resources::cpu_mem(5.0, 5_120.0)),
    );
    let tree = Arc::new(Tree::new(&spec).unwrap());
    let ready = Arc::new(ReadyQueue::new(config.ready_queue_capacity));
    let tracker = Tracker::new(
        Arc::clone(&config),
        Arc::clone(&ready),
        Arc::new(NoopObserver),
        Arc::new(clock.clone()),
    );
    let scheduler = Scheduler::new(
        Arc::clone(&tree),
        Arc::clone(&tracker),
        Arc::clone(&ready),
        Arc::clone(&config),
    );
    let preemptor = Preemptor::new(
        Arc::clone(&tree),
        Arc::clone(&tracker),
        Arc::clone(&config),
    );
    let status = Arc::new(StatusUpdateProcessor::new(Arc::clone(&tracker)));
    let processor = Arc::new(EventProcessor::new(
        status,
        config.event_buckets,
        config.event_bucket_capacity,
    ));
    let placements = Arc::new(Queue::<Placement>::new(
        "placements",
        config.placement_queue_capacity,
    ));
    let handler = ServiceHandler::new(
        Arc::clone(&tree),
        Arc::clone(&tracker),
        Arc::clone(&ready),
        placements,
        Arc::clone(&preemptor),
        Arc::clone(&processor),
        Arc::clone(&config),
    );
    handler.set_started(true);
    Fixture {
        clock,
        tree,
        tracker,
        ready,
        scheduler,
        preemptor,
        processor,
        handler,
    }
}

pub(crate) fn task(job: &str, instance: u32, cpu: f64, mem: f64) -> Task {
    Task::new(job, instance, Resources::cpu_mem(cpu, mem))
}

pub(crate) fn gang(tasks: Vec<Task>) -> Gang {
    Gang::new(tasks).unwrap()
}
