// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preemption: ranking and the periodic candidate sweep.
//!
//! Eviction order is (state READY before RUNNING), then ascending
//! priority, then newest start first. A task is only ranked in if it
//! shrinks the remaining requirement; the prefix stops as soon as the
//! requirement is covered.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use muster_core::{PoolId, Resources, RmConfig, TaskId, TaskState};

use crate::queue::Queue;
use crate::rmtask::RmTask;
use crate::tracker::Tracker;
use crate::tree::Tree;

/// A task picked for eviction, surfaced through the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreemptionCandidate {
    pub task_id: TaskId,
    pub reason: String,
}

/// Rank the pool's active tasks into eviction order and keep the prefix
/// whose cumulative resources cover `required`.
pub fn rank_tasks(tracker: &Tracker, pool: &PoolId, required: Resources) -> Vec<Arc<RmTask>> {
    if required.is_zero() {
        return Vec::new();
    }
    let by_state = tracker.get_active_tasks(
        None,
        Some(pool),
        &[TaskState::Ready, TaskState::Running],
    );

    let mut ordered: Vec<(Arc<RmTask>, u32, Option<Instant>)> = Vec::new();
    for state in [TaskState::Ready, TaskState::Running] {
        let mut tasks: Vec<(Arc<RmTask>, u32, Option<Instant>)> = by_state
            .get(&state)
            .into_iter()
            .flatten()
            .map(|t| {
                let priority = t.task().priority;
                let started = t.stats().start_time;
                (Arc::clone(t), priority, started)
            })
            .collect();
        // Ascending priority; newest start first within a priority.
        tasks.sort_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));
        ordered.extend(tasks);
    }

    let mut picked = Vec::new();
    let mut remaining = required;
    for (task, _, _) in ordered {
        if remaining.is_zero() {
            break;
        }
        let res = task.task().resource;
        if remaining - res == remaining {
            // Nothing this task holds is still needed.
            continue;
        }
        remaining -= res;
        picked.push(task);
    }
    picked
}

/// Periodic sweep producing preemption candidates for pools running
/// above their entitlement.
pub struct Preemptor {
    tree: Arc<Tree>,
    tracker: Arc<Tracker>,
    queue: Queue<PreemptionCandidate>,
    in_flight: Mutex<HashSet<TaskId>>,
    config: Arc<RmConfig>,
}

impl Preemptor {
    pub fn new(tree: Arc<Tree>, tracker: Arc<Tracker>, config: Arc<RmConfig>) -> Arc<Self> {
        Arc::new(Self {
            tree,
            tracker,
            queue: Queue::new("preemption", config.preemption_queue_capacity),
            in_flight: Mutex::new(HashSet::new()),
            config,
        })
    }

    /// One sweep over preemption-enabled leaf pools. Returns how many
    /// candidates were queued.
    pub fn sweep_once(&self) -> usize {
        let mut queued = 0;
        for pool in self.tree.leaves() {
            if !pool.preemption_enabled() {
                continue;
            }
            let usage = pool.usage();
            let required = usage.allocation.total - usage.entitlement;
            if required.is_zero() {
                continue;
            }
            debug!(pool = %pool.id(), required = %required, "pool over entitlement");
            for task in rank_tasks(&self.tracker, pool.id(), required) {
                let id = task.id();
                if !self.in_flight.lock().insert(id.clone()) {
                    continue;
                }
                let candidate = PreemptionCandidate {
                    task_id: id.clone(),
                    reason: format!("pool {} over entitlement", pool.id()),
                };
                if self.queue.enqueue(candidate).is_err() {
                    self.in_flight.lock().remove(&id);
                    warn!(pool = %pool.id(), "preemption queue full; sweep truncated");
                    return queued;
                }
                queued += 1;
            }
        }
        queued
    }

    /// Next candidate, blocking up to `timeout`.
    pub async fn dequeue_task(&self, timeout: Duration) -> Option<PreemptionCandidate> {
        let candidate = self.queue.dequeue(timeout).await?;
        self.in_flight.lock().remove(&candidate.task_id);
        Some(candidate)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Sweep loop; ticks until the shutdown signal flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.preemption_period());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.sweep_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("preemptor loop stopped");
    }
}

#[cfg(test)]
#[path = "preemption_tests.rs"]
mod tests;
