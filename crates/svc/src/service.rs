// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service lifecycle: wiring, background loops, shutdown.
//!
//! `Service::start` builds the pool tree, tracker, scheduler, preemptor
//! and event pipeline, spawns the periodic loops (admission, entitlement,
//! preemption sweep, timeout sweep) and flips the handler to started.
//! `stop` reverses it: operations refuse first, then the loops drain.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use muster_core::{
    Clock, PoolSpec, Placement, RmConfig, SystemClock, TaskState, Transition,
    TransitionObserver,
};
use muster_engine::{Preemptor, Queue, ReadyQueue, Scheduler, Tracker, Tree};

use crate::events::EventProcessor;
use crate::handler::ServiceHandler;
use crate::protocol::SvcError;
use crate::respool_svc::RespoolService;
use crate::status::StatusUpdateProcessor;

/// Logs every committed transition with its reason.
struct TracingObserver;

impl TransitionObserver<TaskState> for TracingObserver {
    fn observe(&self, transition: &Transition<TaskState>) {
        debug!(
            task = %transition.machine,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            timed_out = transition.timed_out,
            "transition"
        );
    }
}

pub struct Service {
    config: Arc<RmConfig>,
    tree: Arc<Tree>,
    tracker: Arc<Tracker>,
    scheduler: Arc<Scheduler>,
    preemptor: Arc<Preemptor>,
    processor: Arc<EventProcessor>,
    handler: Arc<ServiceHandler>,
    respool: RespoolService,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service").finish_non_exhaustive()
    }
}

impl Service {
    /// Start with the system clock.
    pub async fn start(config: RmConfig, pools: &PoolSpec) -> Result<Self, SvcError> {
        Self::start_with_clock(config, pools, Arc::new(SystemClock)).await
    }

    pub async fn start_with_clock(
        config: RmConfig,
        pools: &PoolSpec,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SvcError> {
        config
            .validate()
            .map_err(|err| SvcError::InvalidArgument(err.to_string()))?;
        let config = Arc::new(config);

        let tree = Arc::new(Tree::new(pools)?);
        let ready = Arc::new(ReadyQueue::new(config.ready_queue_capacity));
        let tracker = Tracker::new(
            Arc::clone(&config),
            Arc::clone(&ready),
            Arc::new(TracingObserver),
            clock,
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
        let respool = RespoolService::new(Arc::clone(&tree));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        processor.start();
        let handles = vec![
            tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone())),
            tokio::spawn(Arc::clone(&preemptor).run(shutdown_rx.clone())),
            tokio::spawn(entitlement_loop(
                Arc::clone(&tree),
                Arc::clone(&config),
                shutdown_rx.clone(),
            )),
            tokio::spawn(timeout_loop(
                Arc::clone(&tracker),
                Arc::clone(&config),
                shutdown_rx,
            )),
        ];

        handler.set_started(true);
        info!(pools = tree.all().len(), "resource manager started");
        Ok(Self {
            config,
            tree,
            tracker,
            scheduler,
            preemptor,
            processor,
            handler,
            respool,
            shutdown_tx,
            handles: Mutex::new(handles),
        })
    }

    pub fn handler(&self) -> Arc<ServiceHandler> {
        Arc::clone(&self.handler)
    }

    pub fn respool(&self) -> &RespoolService {
        &self.respool
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn preemptor(&self) -> &Arc<Preemptor> {
        &self.preemptor
    }

    pub fn config(&self) -> &Arc<RmConfig> {
        &self.config
    }

    /// Refuse new operations, stop the loops, drain the event pipeline.
    pub async fn stop(&self) {
        self.handler.set_started(false);
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.processor.shutdown().await;
        info!("resource manager stopped");
    }
}

async fn entitlement_loop(
    tree: Arc<Tree>,
    config: Arc<RmConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(config.entitlement_period());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => tree.calculate_entitlement(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("entitlement loop stopped");
}

async fn timeout_loop(
    tracker: Arc<Tracker>,
    config: Arc<RmConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(config.timeout_sweep_period());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let fired = tracker.fire_due_timeouts();
                if fired > 0 {
                    debug!(fired, "timeout sweep");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("timeout loop stopped");
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
