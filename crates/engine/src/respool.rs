// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource pool: one node of the pool tree.
//!
//! A leaf pool carries three gang queues (pending, non-preemptible,
//! controller) and the mutable counters (demand, allocation, entitlement,
//! slack). All queue moves and counter updates for one pool happen under
//! a single mutex, so dropping a gang from pending and charging its
//! allocation is one critical section.

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use muster_core::{Gang, PoolId, PoolSpec, QueueKind, Resources, SchedulingPolicy, Task};

use crate::error::Error;

/// Allocation split by admission category. `total` covers every admitted
/// task; the components gate their respective admission paths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Allocation {
    pub total: Resources,
    pub non_preemptible: Resources,
    pub controller: Resources,
    pub revocable: Resources,
}

impl Allocation {
    fn add(&mut self, res: Resources, kind: QueueKind, revocable: bool) {
        self.total += res;
        match kind {
            QueueKind::NonPreemptible => self.non_preemptible += res,
            QueueKind::Controller => self.controller += res,
            QueueKind::Pending => {}
        }
        if revocable {
            self.revocable += res;
        }
    }

    fn subtract(&mut self, res: Resources, kind: QueueKind, revocable: bool) {
        self.total -= res;
        match kind {
            QueueKind::NonPreemptible => self.non_preemptible -= res,
            QueueKind::Controller => self.controller -= res,
            QueueKind::Pending => {}
        }
        if revocable {
            self.revocable -= res;
        }
    }
}

/// Counter snapshot for observability and the pool-CRUD surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolUsage {
    pub demand: Resources,
    pub allocation: Allocation,
    pub entitlement: Resources,
    pub slack: Resources,
}

/// Priority-banded FIFO of gangs. Under `PriorityFifo` higher-priority
/// gangs dequeue first, FIFO within a band; under `Fifo` arrival order.
struct SubQueue {
    policy: SchedulingPolicy,
    bands: BTreeMap<Reverse<u32>, VecDeque<Gang>>,
    len: usize,
}

impl SubQueue {
    fn new(policy: SchedulingPolicy) -> Self {
        Self {
            policy,
            bands: BTreeMap::new(),
            len: 0,
        }
    }

    fn band_key(&self, gang: &Gang) -> Reverse<u32> {
        match self.policy {
            SchedulingPolicy::PriorityFifo => Reverse(gang.priority()),
            SchedulingPolicy::Fifo => Reverse(0),
        }
    }

    fn push(&mut self, gang: Gang) {
        let key = self.band_key(&gang);
        self.bands.entry(key).or_default().push_back(gang);
        self.len += 1;
    }

    fn push_front(&mut self, gang: Gang) {
        let key = self.band_key(&gang);
        self.bands.entry(key).or_default().push_front(gang);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<Gang> {
        // Bands are removed once drained, so the first key is the head.
        let key = *self.bands.keys().next()?;
        let band = self.bands.get_mut(&key)?;
        let gang = band.pop_front();
        if band.is_empty() {
            self.bands.remove(&key);
        }
        if gang.is_some() {
            self.len -= 1;
        }
        gang
    }

    fn peek(&self, limit: usize) -> Vec<Gang> {
        self.bands
            .values()
            .flat_map(|band| band.iter())
            .take(limit)
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.len
    }
}

struct PoolState {
    demand: Resources,
    allocation: Allocation,
    entitlement: Resources,
    slack: Resources,
    pending: SubQueue,
    non_preemptible: SubQueue,
    controller: SubQueue,
}

impl PoolState {
    fn queue_mut(&mut self, kind: QueueKind) -> &mut SubQueue {
        match kind {
            QueueKind::Pending => &mut self.pending,
            QueueKind::NonPreemptible => &mut self.non_preemptible,
            QueueKind::Controller => &mut self.controller,
        }
    }

    fn queue(&self, kind: QueueKind) -> &SubQueue {
        match kind {
            QueueKind::Pending => &self.pending,
            QueueKind::NonPreemptible => &self.non_preemptible,
            QueueKind::Controller => &self.controller,
        }
    }
}

/// One node in the resource-pool tree. The parent reference is weak;
/// children are owned. Leaf pools (no children) take direct task load.
pub struct ResPool {
    id: PoolId,
    reservation: Resources,
    limit: Resources,
    share: f64,
    policy: SchedulingPolicy,
    controller_limit_share: f64,
    preemption_enabled: bool,
    parent: Option<Weak<ResPool>>,
    children: RwLock<Vec<Arc<ResPool>>>,
    state: Mutex<PoolState>,
}

impl ResPool {
    pub(crate) fn from_spec(spec: &PoolSpec, parent: Option<Weak<ResPool>>) -> Arc<Self> {
        Arc::new(Self {
            id: PoolId::new(spec.id.clone()),
            reservation: spec.reservation,
            limit: spec.limit,
            share: spec.share,
            policy: spec.policy,
            controller_limit_share: spec.controller_limit_share,
            preemption_enabled: spec.preemptible,
            parent,
            children: RwLock::new(Vec::new()),
            state: Mutex::new(PoolState {
                demand: Resources::ZERO,
                allocation: Allocation::default(),
                // Entitlement starts at the configured ceiling and is
                // refined by the periodic tree calculation.
                entitlement: spec.limit,
                slack: spec.limit,
                pending: SubQueue::new(spec.policy),
                non_preemptible: SubQueue::new(spec.policy),
                controller: SubQueue::new(spec.policy),
            }),
        })
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }

    pub fn reservation(&self) -> Resources {
        self.reservation
    }

    pub fn limit(&self) -> Resources {
        self.limit
    }

    pub fn share(&self) -> f64 {
        self.share
    }

    pub fn preemption_enabled(&self) -> bool {
        self.preemption_enabled
    }

    pub fn parent(&self) -> Option<Arc<ResPool>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> Vec<Arc<ResPool>> {
        self.children.read().clone()
    }

    pub(crate) fn add_child(&self, child: Arc<ResPool>) {
        self.children.write().push(child);
    }

    pub(crate) fn remove_child(&self, id: &PoolId) {
        self.children.write().retain(|c| c.id() != id);
    }

    pub fn is_leaf(&self) -> bool {
        self.children.read().is_empty()
    }

    pub fn demand(&self) -> Resources {
        self.state.lock().demand
    }

    pub fn allocation(&self) -> Allocation {
        self.state.lock().allocation
    }

    pub fn entitlement(&self) -> Resources {
        self.state.lock().entitlement
    }

    pub fn slack(&self) -> Resources {
        self.state.lock().slack
    }

    pub fn usage(&self) -> PoolUsage {
        let state = self.state.lock();
        PoolUsage {
            demand: state.demand,
            allocation: state.allocation,
            entitlement: state.entitlement,
            slack: state.slack,
        }
    }

    pub fn queue_len(&self, kind: QueueKind) -> usize {
        self.state.lock().queue(kind).len()
    }

    /// Append a gang to its sub-queue and add its demand, atomically.
    pub fn enqueue_gang(&self, gang: Gang) -> Result<(), Error> {
        if !self.is_leaf() {
            return Err(Error::NotLeaf(self.id.clone()));
        }
        let kind = gang.queue_kind();
        let res = gang.resources();
        let mut state = self.state.lock();
        state.demand += res;
        state.queue_mut(kind).push(gang);
        debug!(pool = %self.id, queue = ?kind, resources = %res, "gang enqueued");
        Ok(())
    }

    /// Admit up to `limit` gangs whose aggregate demand fits their
    /// category's headroom, moving each gang's demand to allocation in
    /// the same critical section. Admission order: non-preemptible,
    /// controller, pending. Members failing `live` are shed first; their
    /// demand was released when they left the tracker.
    pub fn dequeue_gangs(&self, limit: usize, live: &dyn Fn(&Task) -> bool) -> Vec<Gang> {
        let mut out = Vec::new();
        if limit == 0 {
            return out;
        }
        let mut state = self.state.lock();
        for kind in [
            QueueKind::NonPreemptible,
            QueueKind::Controller,
            QueueKind::Pending,
        ] {
            while out.len() < limit {
                let Some(mut gang) = state.queue_mut(kind).pop() else {
                    break;
                };
                gang.retain(|task| live(task));
                if gang.is_empty() {
                    continue;
                }
                let res = gang.resources();
                let revocable = gang.revocable();
                if !self.fits(&state, res, kind, revocable) {
                    // Head-of-line blocks its queue; try the next one.
                    state.queue_mut(kind).push_front(gang);
                    break;
                }
                state.demand -= res;
                state.allocation.add(res, kind, revocable);
                out.push(gang);
            }
        }
        out
    }

    fn fits(&self, state: &PoolState, res: Resources, kind: QueueKind, revocable: bool) -> bool {
        match kind {
            QueueKind::NonPreemptible => {
                (state.allocation.non_preemptible + res).fits_within(&self.reservation)
            }
            QueueKind::Controller => {
                let cap = state.entitlement.scale(self.controller_limit_share);
                (state.allocation.controller + res).fits_within(&cap)
            }
            QueueKind::Pending if revocable => {
                (state.allocation.revocable + res).fits_within(&state.slack)
            }
            QueueKind::Pending => (state.allocation.total + res).fits_within(&state.entitlement),
        }
    }

    /// Read-only snapshot of a sub-queue.
    pub fn peek_gangs(&self, kind: QueueKind, limit: usize) -> Result<Vec<Gang>, Error> {
        if !self.is_leaf() {
            return Err(Error::NotLeaf(self.id.clone()));
        }
        Ok(self.state.lock().queue(kind).peek(limit))
    }

    /// Roll back an admitted gang: head of its queue, allocation back to
    /// demand. Used when the ready queue refuses the gang.
    pub fn return_gang(&self, gang: Gang) {
        let kind = gang.queue_kind();
        let res = gang.resources();
        let revocable = gang.revocable();
        let mut state = self.state.lock();
        state.allocation.subtract(res, kind, revocable);
        state.demand += res;
        state.queue_mut(kind).push_front(gang);
        debug!(pool = %self.id, queue = ?kind, resources = %res, "gang returned to pool");
    }

    pub fn add_to_demand(&self, res: Resources) {
        self.state.lock().demand += res;
    }

    pub fn subtract_from_demand(&self, res: Resources) {
        self.state.lock().demand -= res;
    }

    pub fn add_to_allocation(&self, res: Resources, kind: QueueKind, revocable: bool) {
        self.state.lock().allocation.add(res, kind, revocable);
    }

    pub fn subtract_from_allocation(&self, res: Resources, kind: QueueKind, revocable: bool) {
        self.state.lock().allocation.subtract(res, kind, revocable);
    }

    /// Install a freshly computed entitlement and derive slack from it.
    /// Slack is the revocable-only headroom: entitlement not pinned by
    /// non-revocable allocation.
    pub fn set_entitlement(&self, entitlement: Resources) {
        let mut state = self.state.lock();
        state.entitlement = entitlement;
        let pinned = state.allocation.total - state.allocation.revocable;
        state.slack = entitlement - pinned;
    }
}

impl std::fmt::Debug for ResPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResPool")
            .field("id", &self.id)
            .field("share", &self.share)
            .field("leaf", &self.is_leaf())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "respool_tests.rs"]
mod tests;
