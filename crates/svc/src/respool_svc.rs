// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-pool CRUD surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use muster_core::{PoolId, PoolSpec, Resources};
use muster_engine::{PoolUsage, ResPool, Tree};

use crate::protocol::SvcError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePoolRequest {
    pub parent: PoolId,
    pub spec: PoolSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub id: PoolId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PoolId>,
    pub children: Vec<PoolId>,
    pub is_leaf: bool,
    pub reservation: Resources,
    pub limit: Resources,
    pub share: f64,
    pub usage: PoolUsage,
}

/// Pool CRUD over the shared tree.
pub struct RespoolService {
    tree: Arc<Tree>,
}

impl RespoolService {
    pub fn new(tree: Arc<Tree>) -> Self {
        Self { tree }
    }

    pub fn create_pool(&self, req: CreatePoolRequest) -> Result<PoolInfo, SvcError> {
        let pool = self.tree.create(&req.parent, &req.spec)?;
        info!(pool = %pool.id(), parent = %req.parent, "resource pool created");
        Ok(pool_info(&pool))
    }

    pub fn get_pool(&self, id: &PoolId) -> Result<PoolInfo, SvcError> {
        let pool = self.tree.get(id)?;
        Ok(pool_info(&pool))
    }

    pub fn delete_pool(&self, id: &PoolId) -> Result<(), SvcError> {
        self.tree.delete(id)?;
        info!(pool = %id, "resource pool deleted");
        Ok(())
    }

    /// Every pool, parents before children.
    pub fn list_pools(&self) -> Vec<PoolInfo> {
        self.tree.all().iter().map(pool_info).collect()
    }
}

fn pool_info(pool: &Arc<ResPool>) -> PoolInfo {
    PoolInfo {
        id: pool.id().clone(),
        parent: pool.parent().map(|p| p.id().clone()),
        children: pool.children().iter().map(|c| c.id().clone()).collect(),
        is_leaf: pool.is_leaf(),
        reservation: pool.reservation(),
        limit: pool.limit(),
        share: pool.share(),
        usage: pool.usage(),
    }
}

#[cfg(test)]
#[path = "respool_svc_tests.rs"]
mod tests;
