// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live task: the tracked descriptor plus its state machine.
//!
//! The descriptor and the machine sit behind separate mutexes; a
//! transition commits under the machine lock and its callbacks, counter
//! moves and observer notification run after the lock is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use muster_core::{
    backoff_policy, rules, AttemptId, BackoffPolicy, Builder, Clock, Gang, RmConfig,
    StateMachine, Task, TaskId, TaskState, TransitOptions, Transition,
    TransitionObserver,
};

use crate::error::Error;
use crate::respool::ResPool;
use crate::scheduler::ReadyQueue;
use crate::tracker::StateCounters;

/// Wall-clock facts about a running task.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunTimeStats {
    /// Set exactly once, on first entry to RUNNING.
    pub start_time: Option<Instant>,
    pub start_time_ms: Option<u64>,
}

pub struct RmTask {
    task: Arc<Mutex<Task>>,
    machine: Mutex<StateMachine<TaskState>>,
    pool: Arc<ResPool>,
    ready: Arc<ReadyQueue>,
    counters: Arc<StateCounters>,
    observer: Arc<dyn TransitionObserver<TaskState>>,
    policy: Option<Arc<dyn BackoffPolicy>>,
    config: Arc<RmConfig>,
    clock: Arc<dyn Clock>,
    stats: Mutex<RunTimeStats>,
    /// Shared with the tracker; gates INITIALIZED -> in-flight targets.
    recovery: Arc<AtomicBool>,
}

impl RmTask {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        mut task: Task,
        pool: Arc<ResPool>,
        ready: Arc<ReadyQueue>,
        counters: Arc<StateCounters>,
        observer: Arc<dyn TransitionObserver<TaskState>>,
        config: Arc<RmConfig>,
        clock: Arc<dyn Clock>,
        recovery: Arc<AtomicBool>,
    ) -> Result<Arc<Self>, Error> {
        task.placement_retry_count = 0;
        task.placement_timeout_ms = config.placing_timeout_ms;
        let task = Arc::new(Mutex::new(task));

        let policy = config.enable_placement_backoff.then(|| {
            backoff_policy(
                config.backoff_policy,
                config.placement_retry_backoff(),
                config.max_placement_retries,
            )
        });

        // The PLACING timeout lands on READY until the task has burned
        // through one placement cycle, then on PENDING for readmission.
        let cycle_task = Arc::clone(&task);
        let cycle_policy = policy.clone();
        let placing_rule = rules::placing_timeout_rule(config.placing_timeout())
            .with_pre_callback(Arc::new(move |t: &mut Transition<TaskState>| {
                let retries = cycle_task.lock().placement_retry_count;
                let completed = cycle_policy
                    .as_ref()
                    .map(|p| p.is_cycle_completed(retries))
                    .unwrap_or(false);
                t.to = if completed {
                    TaskState::Pending
                } else {
                    TaskState::Ready
                };
                Ok(())
            }));

        let name = task.lock().id.clone();
        let machine = Builder::new(name.as_str(), TaskState::Initialized)
            .add_rules(rules::task_rules())
            .add_timeout_rule(placing_rule)
            .add_timeout_rule(rules::launching_timeout_rule(config.launching_timeout()))
            .build(clock.as_ref())?;

        Ok(Arc::new(Self {
            task,
            machine: Mutex::new(machine),
            pool,
            ready,
            counters,
            observer,
            policy,
            config,
            clock,
            stats: Mutex::new(RunTimeStats::default()),
            recovery,
        }))
    }

    pub fn id(&self) -> TaskId {
        self.task.lock().id.clone()
    }

    /// Snapshot of the canonical descriptor.
    pub fn task(&self) -> Task {
        self.task.lock().clone()
    }

    pub fn current_state(&self) -> TaskState {
        self.machine.lock().current()
    }

    pub fn reason(&self) -> String {
        self.machine.lock().reason().to_string()
    }

    pub fn last_update_ms(&self) -> u64 {
        self.machine.lock().last_update_ms()
    }

    pub fn pool(&self) -> &Arc<ResPool> {
        &self.pool
    }

    pub fn stats(&self) -> RunTimeStats {
        *self.stats.lock()
    }

    pub fn attempt(&self) -> AttemptId {
        self.task.lock().attempt.clone()
    }

    pub fn placement_retry_count(&self) -> u32 {
        self.task.lock().placement_retry_count
    }

    /// Install a rotated attempt id; the caller then moves the task
    /// back to READY.
    pub fn set_attempt(&self, attempt: AttemptId) {
        self.task.lock().attempt = attempt;
    }

    pub(crate) fn set_hostname(&self, hostname: Option<String>) {
        self.task.lock().hostname = hostname;
    }

    /// Single-member gang snapshot, used for requeues.
    pub fn gang(&self) -> Gang {
        Gang::single(self.task())
    }

    /// Commit a transition and run the post-commit work (counters,
    /// rule callbacks, observer) outside the machine lock.
    pub fn transit_to(
        &self,
        to: TaskState,
        opts: TransitOptions,
    ) -> Result<Transition<TaskState>, Error> {
        let (transition, callbacks) = {
            let mut machine = self.machine.lock();
            let from = machine.current();
            if from == TaskState::Initialized && !self.recovery.load(Ordering::Relaxed) {
                // Recovery targets are only open while priming state at
                // startup.
                if matches!(
                    to,
                    TaskState::Running | TaskState::Launching | TaskState::Launched
                ) {
                    return Err(muster_core::StateMachineError::InvalidTransition {
                        machine: machine.name().to_string(),
                        from,
                        to,
                    }
                    .into());
                }
            }
            let transition = machine.transit_to(to, opts, self.clock.as_ref())?;
            let callbacks = machine.callbacks_for(&transition);
            (transition, callbacks)
        };
        self.after_commit(&transition, callbacks);
        Ok(transition)
    }

    /// Fire the current timeout rule if due, then perform the requeue the
    /// destination calls for: READY pushes the gang back to the ready
    /// queue, PENDING readmits it through the pool.
    pub fn fire_due_timeout(&self) -> Result<Option<Transition<TaskState>>, Error> {
        let fired = {
            let mut machine = self.machine.lock();
            let fired = machine.fire_timeout(self.clock.as_ref())?;
            fired.map(|t| {
                let callbacks = machine.callbacks_for(&t);
                (t, callbacks)
            })
        };
        let Some((transition, callbacks)) = fired else {
            return Ok(None);
        };
        self.after_commit(&transition, callbacks);

        match (transition.from, transition.to) {
            (TaskState::Placing, TaskState::Pending) => self.push_for_readmission()?,
            (TaskState::Placing, TaskState::Ready)
            | (TaskState::Launching, TaskState::Ready) => self.push_for_placement_again()?,
            _ => {}
        }
        Ok(Some(transition))
    }

    fn after_commit(
        &self,
        transition: &Transition<TaskState>,
        callbacks: Vec<muster_core::statemachine::TransitionCallback<TaskState>>,
    ) {
        self.counters.update(transition.from, transition.to);
        if transition.to == TaskState::Running {
            let mut stats = self.stats.lock();
            if stats.start_time.is_none() {
                stats.start_time = Some(self.clock.now());
                stats.start_time_ms = Some(self.clock.epoch_ms());
            }
        }
        for callback in callbacks {
            if let Err(message) = callback(transition) {
                warn!(
                    task = %transition.machine,
                    from = %transition.from,
                    to = %transition.to,
                    message,
                    "transition callback failed"
                );
            }
        }
        self.observer.observe(transition);
        debug!(
            task = %transition.machine,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            "task transitioned"
        );
    }

    /// Bump the retry count and stretch the PLACING timeout by the
    /// backoff policy. Called when the task is handed to a placement
    /// engine.
    pub fn add_backoff(&self) -> Result<(), Error> {
        let policy = self.policy.as_ref().ok_or(Error::BackoffDisabled)?;
        let timeout = {
            let mut task = self.task.lock();
            task.placement_retry_count += 1;
            let timeout = self.config.placing_timeout()
                + policy.next_backoff(task.placement_retry_count);
            task.placement_timeout_ms = timeout.as_millis() as u64;
            timeout
        };
        self.machine
            .lock()
            .set_timeout(TaskState::Placing, timeout)?;
        debug!(task = %self.id(), timeout_ms = timeout.as_millis() as u64, "placement backoff added");
        Ok(())
    }

    /// True once the placement cycle is exhausted and the next timeout
    /// should readmit instead of retry.
    pub fn is_failed_enough_placement(&self) -> bool {
        let retries = self.task.lock().placement_retry_count;
        self.policy
            .as_ref()
            .map(|p| p.is_cycle_completed(retries))
            .unwrap_or(false)
    }

    /// A fresh admission starts a fresh placement cycle.
    pub(crate) fn reset_placement_cycle(&self) {
        {
            let mut task = self.task.lock();
            task.placement_retry_count = 0;
            task.placement_timeout_ms = self.config.placing_timeout_ms;
        }
        if let Err(err) = self
            .machine
            .lock()
            .set_timeout(TaskState::Placing, self.config.placing_timeout())
        {
            warn!(task = %self.id(), %err, "failed to reset placing timeout");
        }
    }

    /// Hand the task back for admission: enqueue on the pool (re-adding
    /// its demand) and release its allocation.
    pub fn push_for_readmission(&self) -> Result<(), Error> {
        let task = self.task();
        let (res, kind, revocable) = (task.resource, task.queue_kind(), task.revocable);
        self.pool.enqueue_gang(Gang::single(task))?;
        self.pool.subtract_from_allocation(res, kind, revocable);
        debug!(task = %self.id(), pool = %self.pool.id(), "task pushed for readmission");
        Ok(())
    }

    /// Hand the task straight back to the placement path.
    pub fn push_for_placement_again(&self) -> Result<(), Error> {
        self.ready
            .enqueue(self.gang())
            .map_err(|_| Error::QueueFull("ready".to_string()))?;
        debug!(task = %self.id(), "task pushed back to the ready queue");
        Ok(())
    }
}

impl std::fmt::Debug for RmTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmTask")
            .field("id", &self.task.lock().id)
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "rmtask_tests.rs"]
mod tests;
