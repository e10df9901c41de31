// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use std::sync::Arc;

use muster_core::{
    FakeClock, NoopObserver, PoolId, PoolSpec, Resources, RmConfig, Task,
};

use crate::respool::ResPool;
use crate::scheduler::ReadyQueue;
use crate::tracker::Tracker;
use crate::tree::Tree;

pub(crate) struct Fixture {
    pub clock: FakeClock,
    pub config: Arc<RmConfig>,
    pub ready: Arc<ReadyQueue>,
    pub tracker: Arc<Tracker>,
    pub tree: Arc<Tree>,
}

impl Fixture {
    pub fn pool(&self, id: &str) -> Arc<ResPool> {
        self.tree.get(&PoolId::new(id)).unwrap()
    }
}

/// Config with second-scale timeouts and a zero backoff step so timeout
/// deadlines stay predictable under the fake clock.
pub(crate) fn test_config() -> RmConfig {
    RmConfig {
        placing_timeout_ms: 1_000,
        launching_timeout_ms: 2_000,
        enable_placement_backoff: true,
        placement_retry_backoff_ms: 0,
        max_placement_retries: 3,
        ..RmConfig::default()
    }
}

/// A tree with a single leaf "p1" under the root: 10 cpu / 10240 MiB,
/// half of it reserved.
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
    Fixture {
        clock,
        config,
        ready,
        tracker,
        tree,
    }
}

pub(crate) fn task(job: &str, instance: u32, cpu: f64, mem: f64) -> Task {
    Task::new(job, instance, Resources::cpu_mem(cpu, mem))
}
