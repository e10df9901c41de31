// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The admission / placement handler.
//!
//! Everything a job manager or placement engine asks of the resource
//! manager goes through here: enqueueing gangs, draining the ready
//! queue, exchanging placements, feeding status updates, kills and
//! preemption. Per-task failures preserve gang membership: the caller
//! learns exactly which task failed first and why.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use muster_core::{
    Gang, Placement, RmConfig, Task, TaskId, TaskState, TransitOptions,
};
use muster_engine::{Error, Preemptor, Queue, QueueFull, ReadyQueue, Tracker, Tree};

use crate::events::EventProcessor;
use crate::protocol::*;

const GANG_MEMBER_FAILED: &str = "task failed because another gang member failed";

pub struct ServiceHandler {
    tree: Arc<Tree>,
    tracker: Arc<Tracker>,
    ready: Arc<ReadyQueue>,
    placements: Arc<Queue<Placement>>,
    preemptor: Arc<Preemptor>,
    processor: Arc<EventProcessor>,
    config: Arc<RmConfig>,
    /// Cleared while not started (or not leading); operations refuse.
    started: AtomicBool,
}

impl ServiceHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: Arc<Tree>,
        tracker: Arc<Tracker>,
        ready: Arc<ReadyQueue>,
        placements: Arc<Queue<Placement>>,
        preemptor: Arc<Preemptor>,
        processor: Arc<EventProcessor>,
        config: Arc<RmConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            tree,
            tracker,
            ready,
            placements,
            preemptor,
            processor,
            config,
            started: AtomicBool::new(false),
        })
    }

    pub fn set_started(&self, started: bool) {
        self.started.store(started, Ordering::Release);
    }

    fn ensure_started(&self) -> Result<(), SvcError> {
        if self.started.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SvcError::Unavailable(
                "resource manager is not started".to_string(),
            ))
        }
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    /// Submit gangs. With a pool id, the gangs are new (or carry rotated
    /// attempt ids); without one, they return unplaced from a placement
    /// engine. A gang admits atomically: one bad task fails them all.
    pub async fn enqueue_gangs(
        &self,
        req: EnqueueGangsRequest,
    ) -> Result<EnqueueGangsResponse, SvcError> {
        self.ensure_started()?;
        let pool = match &req.pool {
            Some(id) => Some(self.tree.get(id)?),
            None => None,
        };

        let mut failed = Vec::new();
        for gang in req.gangs {
            let failures = match &pool {
                Some(pool) => self.enqueue_new_gang(pool, gang, &req.reason),
                None => self.return_unplaced_gang(&gang, &req.reason),
            };
            failed.extend(failures);
        }
        Ok(EnqueueGangsResponse { failed })
    }

    fn enqueue_new_gang(
        &self,
        pool: &Arc<muster_engine::ResPool>,
        gang: Gang,
        _reason: &str,
    ) -> Vec<FailedTask> {
        if gang.is_empty() {
            return Vec::new();
        }
        let mut failed = Vec::new();
        let mut failed_ids = HashSet::new();
        let mut added = Vec::new();
        let mut rotated = false;

        for task in gang.tasks() {
            if self.tracker.get_task(&task.id).is_none() {
                match self.tracker.add_task(task.clone(), Arc::clone(pool)) {
                    Ok(_) => added.push(task.id.clone()),
                    Err(err) => {
                        failed_ids.insert(task.id.clone());
                        failed.push(FailedTask {
                            task_id: task.id.clone(),
                            message: err.to_string(),
                            code: FailureCode::Internal,
                        });
                    }
                }
            } else {
                // Present already: this is a requeue with (maybe) a new
                // attempt id.
                rotated = true;
                if let Some(failure) = self.requeue_task(task) {
                    failed_ids.insert(failure.task_id.clone());
                    failed.push(failure);
                }
            }
        }

        if !failed.is_empty() {
            // All-or-none: pull the tasks this call added and fail the
            // remaining members with the gang code.
            for id in added {
                self.tracker.delete_task(&id);
            }
            failed.extend(mark_gang_failed(&gang, &failed_ids));
            return failed;
        }
        if rotated {
            // Rotated tasks were pushed straight to the ready queue; the
            // gang does not go through admission again.
            return failed;
        }

        for task in gang.tasks() {
            let Some(rm_task) = self.tracker.get_task(&task.id) else {
                continue;
            };
            if let Err(err) = rm_task.transit_to(
                TaskState::Pending,
                TransitOptions::with_reason("gang enqueued")
                    .info("attempt", task.attempt.as_str()),
            ) {
                warn!(task = %task.id, %err, "cannot move task to PENDING");
                return self.abort_gang(&gang, &task.id, &err.to_string());
            }
        }

        if let Err(err) = pool.enqueue_gang(gang.clone()) {
            warn!(pool = %pool.id(), %err, "pool refused the gang");
            let culprit = gang.tasks()[0].id.clone();
            return self.abort_gang(&gang, &culprit, &err.to_string());
        }
        debug!(pool = %pool.id(), tasks = gang.len(), "gang enqueued to pending");
        failed
    }

    /// Remove the whole gang from the tracker and report every member
    /// failed, the culprit with the real message.
    fn abort_gang(&self, gang: &Gang, culprit: &TaskId, message: &str) -> Vec<FailedTask> {
        for id in gang.task_ids() {
            self.tracker.delete_task(id);
        }
        gang.tasks()
            .iter()
            .map(|t| {
                if &t.id == culprit {
                    FailedTask {
                        task_id: t.id.clone(),
                        message: message.to_string(),
                        code: FailureCode::Internal,
                    }
                } else {
                    FailedTask {
                        task_id: t.id.clone(),
                        message: GANG_MEMBER_FAILED.to_string(),
                        code: FailureCode::FailedDueToGangFailed,
                    }
                }
            })
            .collect()
    }

    /// A tracked task arriving again: same attempt is a duplicate; a new
    /// attempt on an in-flight task moves it back to READY.
    fn requeue_task(&self, task: &Task) -> Option<FailedTask> {
        let Some(rm_task) = self.tracker.get_task(&task.id) else {
            return Some(FailedTask {
                task_id: task.id.clone(),
                message: "requeued task is no longer tracked".to_string(),
                code: FailureCode::Internal,
            });
        };
        if rm_task.attempt() == task.attempt {
            return Some(FailedTask {
                task_id: task.id.clone(),
                message: "task already enqueued with the same attempt".to_string(),
                code: FailureCode::AlreadyExist,
            });
        }

        let state = rm_task.current_state();
        if !matches!(
            state,
            TaskState::Launching | TaskState::Launched | TaskState::Running
        ) {
            warn!(task = %task.id, %state, "task cannot take a new attempt in this state");
            return Some(FailedTask {
                task_id: task.id.clone(),
                message: format!("cannot requeue a task in state {state} with a new attempt"),
                code: FailureCode::Internal,
            });
        }

        rm_task.set_attempt(task.attempt.clone());
        if let Err(err) = rm_task.transit_to(
            TaskState::Ready,
            TransitOptions::with_reason("waiting for placement (new attempt)")
                .info("attempt", task.attempt.as_str()),
        ) {
            return Some(FailedTask {
                task_id: task.id.clone(),
                message: err.to_string(),
                code: FailureCode::Internal,
            });
        }
        if let Err(err) = rm_task.push_for_placement_again() {
            return Some(FailedTask {
                task_id: task.id.clone(),
                message: err.to_string(),
                code: FailureCode::Internal,
            });
        }
        info!(task = %task.id, "task requeued with a new attempt");
        None
    }

    /// Gangs a placement engine could not place. READY members are
    /// idempotent no-ops; PLACING members retry placement or readmit
    /// depending on the backoff cycle; anything else fails the gang.
    fn return_unplaced_gang(&self, gang: &Gang, reason: &str) -> Vec<FailedTask> {
        if gang
            .tasks()
            .iter()
            .any(|t| self.tracker.get_task(&t.id).is_none())
        {
            return gang
                .tasks()
                .iter()
                .map(|t| FailedTask {
                    task_id: t.id.clone(),
                    message: "not all tasks in the gang are tracked".to_string(),
                    code: FailureCode::FailedDueToGangFailed,
                })
                .collect();
        }

        let mut failed = Vec::new();
        let mut failed_ids = HashSet::new();
        for task in gang.tasks() {
            if let Err(err) = self.requeue_unplaced_task(task, reason) {
                failed_ids.insert(task.id.clone());
                failed.push(FailedTask {
                    task_id: task.id.clone(),
                    message: err.to_string(),
                    code: FailureCode::Internal,
                });
            }
        }
        if !failed.is_empty() {
            failed.extend(mark_gang_failed(gang, &failed_ids));
        }
        failed
    }

    fn requeue_unplaced_task(&self, task: &Task, reason: &str) -> Result<(), Error> {
        let Some(rm_task) = self.tracker.get_task(&task.id) else {
            return Ok(());
        };
        match rm_task.current_state() {
            TaskState::Ready => Ok(()),
            TaskState::Placing => {
                if rm_task.is_failed_enough_placement() {
                    rm_task.transit_to(
                        TaskState::Pending,
                        TransitOptions::with_reason(format!(
                            "placement cycle complete, readmitting: {reason}"
                        )),
                    )?;
                    rm_task.push_for_readmission()?;
                    info!(task = %task.id, "unplaced task pushed back for admission");
                } else {
                    rm_task.transit_to(
                        TaskState::Ready,
                        TransitOptions::with_reason(format!("placement failed: {reason}")),
                    )?;
                    rm_task.push_for_placement_again()?;
                    info!(task = %task.id, "unplaced task pushed back to the ready queue");
                }
                Ok(())
            }
            state => Err(Error::InvalidArgument(format!(
                "unplaced task {} should be PLACING, found {state}",
                task.id
            ))),
        }
    }

    /// Hand up to `limit` ready gangs of one workload class to a
    /// placement engine, moving their tasks to PLACING with backoff.
    pub async fn dequeue_gangs(
        &self,
        req: DequeueGangsRequest,
    ) -> Result<DequeueGangsResponse, SvcError> {
        self.ensure_started()?;
        let timeout = Duration::from_millis(req.timeout_ms);
        let mut gangs = Vec::new();
        for _ in 0..req.limit {
            let Some(gang) = self.ready.dequeue(req.task_type, timeout).await else {
                debug!(task_type = %req.task_type, "ready queue timed out");
                break;
            };
            let mut members = Vec::new();
            for task in gang.tasks() {
                let Some(rm_task) = self.tracker.get_task(&task.id) else {
                    // Dropped from the gang: no longer tracked.
                    continue;
                };
                if self.config.enable_placement_backoff {
                    if let Err(err) = rm_task.add_backoff() {
                        warn!(task = %task.id, %err, "failed to add placement backoff");
                    }
                }
                if let Err(err) = rm_task.transit_to(
                    TaskState::Placing,
                    TransitOptions::with_reason("handed to a placement engine"),
                ) {
                    warn!(task = %task.id, %err, "cannot move task to PLACING");
                }
                members.push(rm_task.task());
            }
            if members.is_empty() {
                continue;
            }
            match Gang::new(members) {
                Ok(gang) => gangs.push(gang),
                Err(err) => warn!(%err, "dropping malformed dequeued gang"),
            }
        }
        Ok(DequeueGangsResponse { gangs })
    }

    /// Accept placements (PLACING -> PLACED, queue for the job manager)
    /// and unplaced gangs (same semantics as a null-pool enqueue).
    pub async fn set_placements(
        &self,
        req: SetPlacementsRequest,
    ) -> Result<SetPlacementsResponse, SvcError> {
        self.ensure_started()?;
        let mut response = SetPlacementsResponse::default();

        for unplaced in &req.failed {
            response
                .failed_tasks
                .extend(self.return_unplaced_gang(&unplaced.gang, &unplaced.reason));
        }

        for placement in req.placements {
            let placement = self.transit_tasks_in_placement(
                placement,
                TaskState::Placing,
                TaskState::Placed,
                "placement received",
            );
            if placement.is_empty() {
                continue;
            }
            let hostname = placement.hostname.clone();
            self.tracker.set_placement_host(&placement, &hostname);
            if let Err(QueueFull(placement)) = self.placements.enqueue(placement) {
                warn!(host = %hostname, "placements queue full");
                response.failed.push(FailedPlacement {
                    placement,
                    message: "placements queue is full".to_string(),
                });
            }
        }
        Ok(response)
    }

    /// Drain placements for launch, moving tasks PLACED -> LAUNCHING.
    pub async fn get_placements(
        &self,
        req: GetPlacementsRequest,
    ) -> Result<GetPlacementsResponse, SvcError> {
        self.ensure_started()?;
        let timeout = Duration::from_millis(req.timeout_ms);
        let mut placements = Vec::new();
        for _ in 0..req.limit {
            let Some(placement) = self.placements.dequeue(timeout).await else {
                break;
            };
            let placement = self.transit_tasks_in_placement(
                placement,
                TaskState::Placed,
                TaskState::Launching,
                "placement dequeued, waiting for launch",
            );
            if !placement.is_empty() {
                placements.push(placement);
            }
        }
        Ok(GetPlacementsResponse { placements })
    }

    /// Keep only tasks in `expected`, transitioned to `to`.
    fn transit_tasks_in_placement(
        &self,
        mut placement: Placement,
        expected: TaskState,
        to: TaskState,
        reason: &str,
    ) -> Placement {
        placement.retain(|id| {
            let Some(rm_task) = self.tracker.get_task(id) else {
                debug!(task = %id, "task left the tracker; dropping from placement");
                return false;
            };
            let state = rm_task.current_state();
            if state != expected {
                warn!(task = %id, %state, %expected, "task not in expected state; dropping from placement");
                return false;
            }
            match rm_task.transit_to(to, TransitOptions::with_reason(reason)) {
                Ok(_) => true,
                Err(err) => {
                    warn!(task = %id, %err, "placement transition failed");
                    false
                }
            }
        });
        placement
    }

    /// Feed status updates into the bucketed processor; echoes the purge
    /// watermark.
    pub async fn notify_task_updates(
        &self,
        req: NotifyTaskUpdatesRequest,
    ) -> Result<NotifyTaskUpdatesResponse, SvcError> {
        self.ensure_started()?;
        if req.events.is_empty() {
            warn!("notify_task_updates called with no events");
        }
        for event in req.events {
            self.processor.add_event(event).await?;
        }
        Ok(NotifyTaskUpdatesResponse {
            purge_offset: self.processor.event_progress(),
        })
    }

    /// Kill tasks by id; not-found and not-killed partitions are
    /// reported separately.
    pub fn kill_tasks(&self, req: KillTasksRequest) -> Result<KillTasksResponse, SvcError> {
        self.ensure_started()?;
        if req.task_ids.is_empty() {
            return Err(SvcError::InvalidArgument(
                "kill_tasks called with no tasks".to_string(),
            ));
        }
        let mut response = KillTasksResponse::default();
        for id in req.task_ids {
            let Some(rm_task) = self.tracker.get_task(&id) else {
                response.not_found.push(id);
                continue;
            };
            let attempt = rm_task.attempt();
            match self.tracker.mark_it_invalid(&id, &attempt) {
                Ok(()) => {
                    info!(task = %id, "task killed and removed from the tracker");
                }
                Err(err) => {
                    warn!(task = %id, %err, "task could not be killed");
                    response.not_killed.push(id);
                }
            }
        }
        Ok(response)
    }

    /// Pull preemption candidates, moving each to PREEMPTING. Candidates
    /// that cannot transition any more are skipped.
    pub async fn get_preemptible_tasks(
        &self,
        req: GetPreemptibleTasksRequest,
    ) -> Result<GetPreemptibleTasksResponse, SvcError> {
        self.ensure_started()?;
        let timeout = Duration::from_millis(req.timeout_ms);
        let mut candidates = Vec::new();
        for _ in 0..req.limit {
            let Some(candidate) = self.preemptor.dequeue_task(timeout).await else {
                break;
            };
            let Some(rm_task) = self.tracker.get_task(&candidate.task_id) else {
                warn!(task = %candidate.task_id, "preemption candidate left the tracker");
                continue;
            };
            match rm_task.transit_to(
                TaskState::Preempting,
                TransitOptions::with_reason("preemption triggered"),
            ) {
                Ok(_) => candidates.push(candidate),
                Err(err) => {
                    // The task may have finished since it was ranked.
                    warn!(task = %candidate.task_id, %err, "cannot move candidate to PREEMPTING");
                }
            }
        }
        Ok(GetPreemptibleTasksResponse { candidates })
    }

    /// Peek the pending gangs of a leaf pool, grouped by sub-queue.
    pub fn get_pending_tasks(
        &self,
        req: GetPendingTasksRequest,
    ) -> Result<GetPendingTasksResponse, SvcError> {
        self.ensure_started()?;
        let pool = self.tree.get(&req.pool)?;
        if !pool.is_leaf() {
            return Err(SvcError::InvalidArgument(format!(
                "resource pool {} is not a leaf",
                req.pool
            )));
        }
        let mut by_queue = HashMap::new();
        for kind in muster_core::QueueKind::ALL {
            let gangs = pool.peek_gangs(kind, req.limit)?;
            if gangs.is_empty() {
                continue;
            }
            by_queue.insert(
                kind,
                gangs
                    .iter()
                    .map(|g| PendingGang {
                        task_ids: g.task_ids().cloned().collect(),
                    })
                    .collect(),
            );
        }
        Ok(GetPendingTasksResponse { by_queue })
    }

    /// Out-of-band state corrections from the job manager. Terminal
    /// entries finish the task; others just advance the machine.
    pub fn update_tasks_state(&self, req: UpdateTasksStateRequest) -> Result<(), SvcError> {
        self.ensure_started()?;
        for entry in req.entries {
            let Some(rm_task) = self.tracker.get_task(&entry.task_id) else {
                continue;
            };
            if rm_task.attempt() != entry.attempt {
                continue;
            }
            if entry.state.is_terminal() {
                match self.tracker.mark_it_done(&entry.task_id, &entry.attempt) {
                    Ok(()) => self.tracker.counters().increment(entry.state),
                    Err(err) => {
                        warn!(task = %entry.task_id, %err, "could not finish task");
                    }
                }
                continue;
            }
            if let Err(err) = rm_task.transit_to(
                entry.state,
                TransitOptions::with_reason(format!("task moved to {}", entry.state)),
            ) {
                debug!(task = %entry.task_id, to = %entry.state, %err, "state update rejected");
            }
        }
        Ok(())
    }

    /// Tasks of a type on each of the given hosts.
    pub fn get_tasks_by_hosts(
        &self,
        req: GetTasksByHostsRequest,
    ) -> Result<GetTasksByHostsResponse, SvcError> {
        self.ensure_started()?;
        let host_tasks = self
            .tracker
            .tasks_by_hosts(&req.hostnames, req.task_type)
            .into_iter()
            .map(|(host, tasks)| (host, tasks.iter().map(|t| t.task()).collect()))
            .collect();
        Ok(GetTasksByHostsResponse { host_tasks })
    }

    /// Active tasks grouped by state, with their last transition reason.
    pub fn get_active_tasks(
        &self,
        req: GetActiveTasksRequest,
    ) -> Result<GetActiveTasksResponse, SvcError> {
        self.ensure_started()?;
        let by_state = self
            .tracker
            .get_active_tasks(req.job.as_ref(), req.pool.as_ref(), &req.states)
            .into_iter()
            .map(|(state, tasks)| {
                let entries = tasks
                    .iter()
                    .map(|t| TaskEntry {
                        task_id: t.id(),
                        state,
                        reason: t.reason(),
                        last_update_ms: t.last_update_ms(),
                        hostname: t.task().hostname,
                    })
                    .collect();
                (state, entries)
            })
            .collect();
        Ok(GetActiveTasksResponse { by_state })
    }
}

/// Failure entries for the members not already in `failed_ids`.
fn mark_gang_failed(gang: &Gang, failed_ids: &HashSet<TaskId>) -> Vec<FailedTask> {
    gang.tasks()
        .iter()
        .filter(|t| !failed_ids.contains(&t.id))
        .map(|t| FailedTask {
            task_id: t.id.clone(),
            message: GANG_MEMBER_FAILED.to_string(),
            code: FailureCode::FailedDueToGangFailed,
        })
        .collect()
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
