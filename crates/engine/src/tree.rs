// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-pool tree: registry, CRUD and entitlement calculation.
//!
//! Parents own their children; the child's back-pointer is weak and is
//! only used for upward traversal. Entitlement flows top-down: each
//! node's entitlement is divided among its children by share weight,
//! clamped to [reservation, limit], with unused headroom redistributed
//! to unsaturated siblings.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use muster_core::{PoolId, PoolSpec, Resources};

use crate::error::Error;
use crate::respool::ResPool;

pub struct Tree {
    root: Arc<ResPool>,
    index: RwLock<IndexMap<PoolId, Arc<ResPool>>>,
}

impl Tree {
    /// Build the tree from its declarative spec. Pool ids must be unique
    /// across the whole tree.
    pub fn new(spec: &PoolSpec) -> Result<Self, Error> {
        let mut index = IndexMap::new();
        let root = build_node(spec, None, &mut index)?;
        let tree = Self {
            root,
            index: RwLock::new(index),
        };
        tree.calculate_entitlement();
        Ok(tree)
    }

    pub fn root(&self) -> &Arc<ResPool> {
        &self.root
    }

    pub fn get(&self, id: &PoolId) -> Result<Arc<ResPool>, Error> {
        self.index
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::PoolNotFound(id.clone()))
    }

    pub fn contains(&self, id: &PoolId) -> bool {
        self.index.read().contains_key(id)
    }

    /// All pools, parents before children.
    pub fn all(&self) -> Vec<Arc<ResPool>> {
        self.index.read().values().cloned().collect()
    }

    /// Leaf pools in creation order.
    pub fn leaves(&self) -> Vec<Arc<ResPool>> {
        self.index
            .read()
            .values()
            .filter(|p| p.is_leaf())
            .cloned()
            .collect()
    }

    /// Attach a new subtree under an existing pool. The parent must not
    /// hold queued or admitted work, since it stops being a leaf.
    pub fn create(&self, parent_id: &PoolId, spec: &PoolSpec) -> Result<Arc<ResPool>, Error> {
        let parent = self.get(parent_id)?;
        if parent.is_leaf() {
            let usage = parent.usage();
            let busy = !usage.demand.is_zero()
                || !usage.allocation.total.is_zero()
                || muster_core::QueueKind::ALL
                    .iter()
                    .any(|&k| parent.queue_len(k) > 0);
            if busy {
                return Err(Error::InvalidArgument(format!(
                    "pool {parent_id} holds work and cannot become an inner node"
                )));
            }
        }

        let mut index = self.index.write();
        let pool = build_node(spec, Some(&parent), &mut index)?;
        parent.add_child(Arc::clone(&pool));
        drop(index);

        self.calculate_entitlement();
        debug!(pool = %pool.id(), parent = %parent_id, "pool created");
        Ok(pool)
    }

    /// Remove an empty leaf pool.
    pub fn delete(&self, id: &PoolId) -> Result<(), Error> {
        let pool = self.get(id)?;
        if pool.id() == self.root.id() {
            return Err(Error::InvalidArgument("cannot delete the root pool".into()));
        }
        if !pool.is_leaf() {
            return Err(Error::InvalidArgument(format!(
                "pool {id} has children; delete them first"
            )));
        }
        let usage = pool.usage();
        if !usage.demand.is_zero() || !usage.allocation.total.is_zero() {
            return Err(Error::InvalidArgument(format!(
                "pool {id} still holds demand or allocation"
            )));
        }
        if let Some(parent) = pool.parent() {
            parent.remove_child(id);
        }
        self.index.write().shift_remove(id);
        debug!(pool = %id, "pool deleted");
        Ok(())
    }

    /// Recompute entitlement for every node, top-down, and refresh slack.
    pub fn calculate_entitlement(&self) {
        self.root.set_entitlement(self.root.limit());
        let mut frontier = VecDeque::from([Arc::clone(&self.root)]);
        while let Some(node) = frontier.pop_front() {
            let children = node.children();
            if children.is_empty() {
                continue;
            }
            let parent_ent = node.entitlement();
            let entitlements = divide_entitlement(parent_ent, &children);
            for (child, ent) in children.iter().zip(entitlements) {
                child.set_entitlement(ent);
                frontier.push_back(Arc::clone(child));
            }
        }
    }
}

fn build_node(
    spec: &PoolSpec,
    parent: Option<&Arc<ResPool>>,
    index: &mut IndexMap<PoolId, Arc<ResPool>>,
) -> Result<Arc<ResPool>, Error> {
    let id = PoolId::new(spec.id.clone());
    if index.contains_key(&id) {
        return Err(Error::InvalidArgument(format!("duplicate pool id: {id}")));
    }
    let pool = ResPool::from_spec(spec, parent.map(Arc::downgrade));
    index.insert(id, Arc::clone(&pool));
    for child_spec in &spec.children {
        let child = build_node(child_spec, Some(&pool), index)?;
        pool.add_child(child);
    }
    Ok(pool)
}

/// Split a parent entitlement among children, per resource dimension.
fn divide_entitlement(parent: Resources, children: &[Arc<ResPool>]) -> Vec<Resources> {
    let cpu = distribute(
        parent.cpu,
        &dimension(children, |r| r.cpu),
    );
    let mem = distribute(
        parent.mem_mb,
        &dimension(children, |r| r.mem_mb),
    );
    let disk = distribute(
        parent.disk_mb,
        &dimension(children, |r| r.disk_mb),
    );
    let gpu = distribute(
        parent.gpu,
        &dimension(children, |r| r.gpu),
    );
    (0..children.len())
        .map(|i| Resources::new(cpu[i], mem[i], disk[i], gpu[i]))
        .collect()
}

fn dimension(children: &[Arc<ResPool>], get: impl Fn(&Resources) -> f64) -> Vec<(f64, f64, f64)> {
    children
        .iter()
        .map(|c| (get(&c.reservation()), get(&c.limit()), c.share()))
        .collect()
}

const EPS: f64 = 1e-9;

/// Water-filling for one dimension over (reservation, limit, share)
/// triples: start every child at its floor, then pour the remainder by
/// share weight, re-pouring what saturated children cannot absorb.
fn distribute(parent: f64, children: &[(f64, f64, f64)]) -> Vec<f64> {
    let mut ent: Vec<f64> = children.iter().map(|&(res, lim, _)| res.min(lim)).collect();
    let total_floor: f64 = ent.iter().sum();
    // Overcommitted reservations scale down so the invariant
    // sum(children) <= parent still holds.
    if total_floor > parent {
        if total_floor > EPS {
            let factor = parent / total_floor;
            for e in ent.iter_mut() {
                *e *= factor;
            }
        }
        return ent;
    }

    let mut remaining = parent - total_floor;
    let mut active: Vec<usize> = (0..children.len())
        .filter(|&i| children[i].1 - ent[i] > EPS)
        .collect();
    while remaining > EPS && !active.is_empty() {
        let total_share: f64 = active.iter().map(|&i| children[i].2).sum();
        if total_share <= EPS {
            break;
        }
        let mut poured = 0.0;
        let mut still_open = Vec::new();
        for &i in &active {
            let offered = remaining * children[i].2 / total_share;
            let room = children[i].1 - ent[i];
            let taken = offered.min(room);
            ent[i] += taken;
            poured += taken;
            if children[i].1 - ent[i] > EPS {
                still_open.push(i);
            }
        }
        remaining -= poured;
        if poured <= EPS {
            break;
        }
        active = still_open;
    }
    ent
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
