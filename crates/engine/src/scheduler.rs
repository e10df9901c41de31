// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ready queues and the admission loop.
//!
//! The scheduler periodically asks every leaf pool for admissible gangs,
//! moves their tasks PENDING -> READY and hands the gangs to the
//! per-workload-class ready queues that placement engines drain. A gang
//! the ready queue cannot take is rolled back into its pool at the head.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use muster_core::{Gang, RmConfig, TaskState, TaskType, TransitOptions};

use crate::queue::{Queue, QueueFull};
use crate::respool::ResPool;
use crate::tracker::Tracker;
use crate::tree::Tree;

/// Cross-pool ready queue, segmented by workload class.
pub struct ReadyQueue {
    queues: HashMap<TaskType, Queue<Gang>>,
}

impl ReadyQueue {
    pub fn new(capacity: usize) -> Self {
        let queues = TaskType::ALL
            .into_iter()
            .map(|tt| (tt, Queue::new(format!("ready-{tt}"), capacity)))
            .collect();
        Self { queues }
    }

    pub fn enqueue(&self, gang: Gang) -> Result<(), QueueFull<Gang>> {
        match self.queues.get(&gang.task_type()) {
            Some(queue) => queue.enqueue(gang),
            None => Err(QueueFull(gang)),
        }
    }

    /// Blocking dequeue of the next gang of the given class.
    pub async fn dequeue(&self, task_type: TaskType, timeout: Duration) -> Option<Gang> {
        self.queues.get(&task_type)?.dequeue(timeout).await
    }

    pub fn len(&self, task_type: TaskType) -> usize {
        self.queues.get(&task_type).map(Queue::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(Queue::is_empty)
    }
}

/// Drives admission from the pool tree into the ready queues.
pub struct Scheduler {
    tree: Arc<Tree>,
    tracker: Arc<Tracker>,
    ready: Arc<ReadyQueue>,
    config: Arc<RmConfig>,
}

impl Scheduler {
    pub fn new(
        tree: Arc<Tree>,
        tracker: Arc<Tracker>,
        ready: Arc<ReadyQueue>,
        config: Arc<RmConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            tree,
            tracker,
            ready,
            config,
        })
    }

    pub fn ready(&self) -> &Arc<ReadyQueue> {
        &self.ready
    }

    /// One admission pass over every leaf pool. Returns the number of
    /// tasks promoted to READY.
    pub fn schedule_once(&self) -> usize {
        let mut promoted = 0;
        for pool in self.tree.leaves() {
            let tracker = Arc::clone(&self.tracker);
            let gangs = pool.dequeue_gangs(self.config.admission_batch_size, &move |task| {
                tracker.get_task(&task.id).is_some()
            });
            for gang in gangs {
                promoted += self.admit(&pool, gang);
            }
        }
        promoted
    }

    fn admit(&self, pool: &Arc<ResPool>, gang: Gang) -> usize {
        let mut admitted = Vec::new();
        let mut members = Vec::new();
        for task in gang.tasks() {
            let Some(rm_task) = self.tracker.get_task(&task.id) else {
                // Left the tracker after the pool charged it.
                pool.subtract_from_allocation(task.resource, task.queue_kind(), task.revocable);
                continue;
            };
            match rm_task.transit_to(
                TaskState::Ready,
                TransitOptions::with_reason("admitted to the ready queue"),
            ) {
                Ok(_) => {
                    rm_task.reset_placement_cycle();
                    members.push(rm_task.task());
                    admitted.push(rm_task);
                }
                Err(err) => {
                    warn!(task = %task.id, %err, "admission transition failed");
                    pool.subtract_from_allocation(task.resource, task.queue_kind(), task.revocable);
                }
            }
        }
        if members.is_empty() {
            return 0;
        }
        let gang = match Gang::new(members) {
            Ok(gang) => gang,
            Err(err) => {
                warn!(pool = %pool.id(), %err, "dropping malformed admitted gang");
                return 0;
            }
        };

        match self.ready.enqueue(gang) {
            Ok(()) => admitted.len(),
            Err(QueueFull(gang)) => {
                // Demand-rollback: the gang goes back to the head of its
                // pool queue and the tasks return to PENDING.
                info!(pool = %pool.id(), "ready queue full; rolling admission back");
                for rm_task in &admitted {
                    if let Err(err) = rm_task.transit_to(
                        TaskState::Pending,
                        TransitOptions::with_reason("ready queue full"),
                    ) {
                        warn!(task = %rm_task.id(), %err, "rollback transition failed");
                    }
                }
                pool.return_gang(gang);
                0
            }
        }
    }

    /// Admission loop; ticks until the shutdown signal flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.scheduling_period());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let promoted = self.schedule_once();
                    if promoted > 0 {
                        debug!(promoted, "admission pass");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("scheduler loop stopped");
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
