// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide registry of live task state machines.
//!
//! The tracker is the only shared mutable index over tasks. It owns the
//! `RmTask` instances; pools and handlers hold `Arc` handles for lookup
//! but removal always goes through here so the by-host index, per-state
//! counters and pool accounting stay consistent.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use muster_core::{
    AttemptId, Clock, JobId, Placement, PoolId, RmConfig, Task, TaskId, TaskState, TaskType,
    TransitionObserver,
};

use crate::error::Error;
use crate::respool::ResPool;
use crate::rmtask::RmTask;
use crate::scheduler::ReadyQueue;

/// Live count of tasks per state. Terminal states accumulate: they count
/// completions rather than live tasks.
#[derive(Default)]
pub struct StateCounters {
    counts: Mutex<HashMap<TaskState, i64>>,
}

impl StateCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move one task from `from` to `to`.
    pub fn update(&self, from: TaskState, to: TaskState) {
        let mut counts = self.counts.lock();
        *counts.entry(from).or_insert(0) -= 1;
        *counts.entry(to).or_insert(0) += 1;
    }

    pub fn increment(&self, state: TaskState) {
        *self.counts.lock().entry(state).or_insert(0) += 1;
    }

    pub fn decrement(&self, state: TaskState) {
        *self.counts.lock().entry(state).or_insert(0) -= 1;
    }

    pub fn get(&self, state: TaskState) -> i64 {
        self.counts.lock().get(&state).copied().unwrap_or(0)
    }

    /// Gauge snapshot for observability.
    pub fn snapshot(&self) -> HashMap<TaskState, i64> {
        self.counts.lock().clone()
    }
}

struct Inner {
    tasks: HashMap<TaskId, Arc<RmTask>>,
    by_host: HashMap<String, HashSet<TaskId>>,
}

pub struct Tracker {
    inner: RwLock<Inner>,
    counters: Arc<StateCounters>,
    ready: Arc<ReadyQueue>,
    observer: Arc<dyn TransitionObserver<TaskState>>,
    config: Arc<RmConfig>,
    clock: Arc<dyn Clock>,
    /// While set, INITIALIZED may transition straight to in-flight
    /// states to prime recovered tasks.
    recovery: Arc<AtomicBool>,
}

impl Tracker {
    pub fn new(
        config: Arc<RmConfig>,
        ready: Arc<ReadyQueue>,
        observer: Arc<dyn TransitionObserver<TaskState>>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner {
                tasks: HashMap::new(),
                by_host: HashMap::new(),
            }),
            counters: Arc::new(StateCounters::new()),
            ready,
            observer,
            config,
            clock,
            recovery: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn counters(&self) -> &Arc<StateCounters> {
        &self.counters
    }

    /// Open or close the startup-only recovery transitions.
    pub fn set_recovery(&self, enabled: bool) {
        self.recovery.store(enabled, Ordering::Relaxed);
    }

    /// Register a new task in INITIALIZED. Fails if the identity is
    /// already tracked.
    pub fn add_task(&self, task: Task, pool: Arc<ResPool>) -> Result<Arc<RmTask>, Error> {
        let mut inner = self.inner.write();
        if inner.tasks.contains_key(&task.id) {
            return Err(Error::TaskAlreadyExists(task.id));
        }
        let id = task.id.clone();
        let rm_task = RmTask::new(
            task,
            pool,
            Arc::clone(&self.ready),
            Arc::clone(&self.counters),
            Arc::clone(&self.observer),
            Arc::clone(&self.config),
            Arc::clone(&self.clock),
            Arc::clone(&self.recovery),
        )?;
        inner.tasks.insert(id.clone(), Arc::clone(&rm_task));
        drop(inner);
        self.counters.increment(TaskState::Initialized);
        debug!(task = %id, "task added to tracker");
        Ok(rm_task)
    }

    pub fn get_task(&self, id: &TaskId) -> Option<Arc<RmTask>> {
        self.inner.read().tasks.get(id).cloned()
    }

    /// Remove a task and its index entries; decrements its live-state
    /// counter.
    pub fn delete_task(&self, id: &TaskId) -> Option<Arc<RmTask>> {
        let removed = {
            let mut inner = self.inner.write();
            let removed = inner.tasks.remove(id);
            if let Some(task) = &removed {
                if let Some(host) = task.task().hostname {
                    if let Some(ids) = inner.by_host.get_mut(&host) {
                        ids.remove(id);
                        if ids.is_empty() {
                            inner.by_host.remove(&host);
                        }
                    }
                }
            }
            removed
        };
        if let Some(task) = &removed {
            self.counters.decrement(task.current_state());
            debug!(task = %id, "task deleted from tracker");
        }
        removed
    }

    /// Finish a task: release the resources it holds from its pool and
    /// drop it from the tracker. A stale attempt id is a no-op.
    pub fn mark_it_done(&self, id: &TaskId, attempt: &AttemptId) -> Result<(), Error> {
        let task = self
            .get_task(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        if &task.attempt() != attempt {
            debug!(task = %id, "stale attempt in mark_it_done; ignoring");
            return Ok(());
        }
        self.release_resources(&task);
        self.delete_task(id);
        Ok(())
    }

    /// Like `mark_it_done` but records the task as killed for
    /// accounting.
    pub fn mark_it_invalid(&self, id: &TaskId, attempt: &AttemptId) -> Result<(), Error> {
        let task = self
            .get_task(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        if &task.attempt() != attempt {
            debug!(task = %id, "stale attempt in mark_it_invalid; ignoring");
            return Ok(());
        }
        self.release_resources(&task);
        self.delete_task(id);
        self.counters.increment(TaskState::Killed);
        Ok(())
    }

    /// What a departing task gives back depends on how far it got:
    /// demand before admission, allocation after.
    fn release_resources(&self, task: &Arc<RmTask>) {
        let snapshot = task.task();
        let state = task.current_state();
        let pool = task.pool();
        match state {
            TaskState::Initialized | TaskState::Pending => {
                pool.subtract_from_demand(snapshot.resource);
            }
            state if state.is_terminal() => {}
            _ => {
                pool.subtract_from_allocation(
                    snapshot.resource,
                    snapshot.queue_kind(),
                    snapshot.revocable,
                );
            }
        }
    }

    /// Tasks of the given type on each of the given hosts.
    pub fn tasks_by_hosts(
        &self,
        hostnames: &[String],
        task_type: Option<TaskType>,
    ) -> HashMap<String, Vec<Arc<RmTask>>> {
        let inner = self.inner.read();
        let mut out = HashMap::new();
        for host in hostnames {
            let Some(ids) = inner.by_host.get(host) else {
                continue;
            };
            let tasks: Vec<Arc<RmTask>> = ids
                .iter()
                .filter_map(|id| inner.tasks.get(id))
                .filter(|t| task_type.map_or(true, |tt| t.task().task_type == tt))
                .cloned()
                .collect();
            if !tasks.is_empty() {
                out.insert(host.clone(), tasks);
            }
        }
        out
    }

    /// Active tasks grouped by state, optionally filtered by job, pool
    /// and state set (empty = all states).
    pub fn get_active_tasks(
        &self,
        job: Option<&JobId>,
        pool: Option<&PoolId>,
        states: &[TaskState],
    ) -> HashMap<TaskState, Vec<Arc<RmTask>>> {
        let inner = self.inner.read();
        let mut out: HashMap<TaskState, Vec<Arc<RmTask>>> = HashMap::new();
        for task in inner.tasks.values() {
            let state = task.current_state();
            if !states.is_empty() && !states.contains(&state) {
                continue;
            }
            if let Some(job) = job {
                if &task.task().job_id != job {
                    continue;
                }
            }
            if let Some(pool) = pool {
                if task.pool().id() != pool {
                    continue;
                }
            }
            out.entry(state).or_default().push(Arc::clone(task));
        }
        out
    }

    pub fn update_counters(&self, from: TaskState, to: TaskState) {
        self.counters.update(from, to);
    }

    /// Record the host every task in a placement landed on.
    pub fn set_placement_host(&self, placement: &Placement, hostname: &str) {
        let mut inner = self.inner.write();
        for id in &placement.tasks {
            let Some(task) = inner.tasks.get(id).cloned() else {
                continue;
            };
            if let Some(previous) = task.task().hostname {
                if let Some(ids) = inner.by_host.get_mut(&previous) {
                    ids.remove(id);
                }
            }
            task.set_hostname(Some(hostname.to_string()));
            inner
                .by_host
                .entry(hostname.to_string())
                .or_default()
                .insert(id.clone());
        }
    }

    /// Apply every due PLACING / LAUNCHING timeout rule. Returns how
    /// many fired. Called from the service timer loop.
    pub fn fire_due_timeouts(&self) -> usize {
        let tasks: Vec<Arc<RmTask>> = self.inner.read().tasks.values().cloned().collect();
        let mut fired = 0;
        for task in tasks {
            match task.fire_due_timeout() {
                Ok(Some(_)) => fired += 1,
                Ok(None) => {}
                Err(err) => {
                    warn!(task = %task.id(), %err, "timeout handling failed");
                }
            }
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tasks.is_empty()
    }

    /// Drop every task without touching pool accounting; teardown only.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.tasks.clear();
        inner.by_host.clear();
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
