// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-manager configuration and the declarative pool tree.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicyKind;
use crate::resources::Resources;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How gangs are ordered within a pool's pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Highest gang priority first, FIFO within a priority.
    #[default]
    PriorityFifo,
    /// Pure arrival order.
    Fifo,
}

/// Tunables for the admission core. All durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RmConfig {
    /// Time a task may sit in PLACING before the timeout rule fires.
    pub placing_timeout_ms: u64,
    /// Time a task may sit in LAUNCHING before returning to READY.
    pub launching_timeout_ms: u64,
    /// Stretch the PLACING timeout per retry using the backoff policy.
    pub enable_placement_backoff: bool,
    /// Base step fed to the backoff policy.
    pub placement_retry_backoff_ms: u64,
    /// Placement-cycle length: timed-out tasks return to PENDING once
    /// their retry count reaches this.
    pub max_placement_retries: u32,
    pub backoff_policy: BackoffPolicyKind,
    /// Number of parallel task-status shards.
    pub event_buckets: usize,
    /// Buffered events per bucket before enqueueing backpressures.
    pub event_bucket_capacity: usize,
    /// Preemption-sweep interval.
    pub preemption_period_ms: u64,
    /// Entitlement recomputation interval.
    pub entitlement_period_ms: u64,
    /// Admission-loop interval (pending -> ready promotion).
    pub scheduling_period_ms: u64,
    /// Interval between state-machine timeout sweeps.
    pub timeout_sweep_period_ms: u64,
    /// Gangs admitted per pool per admission tick.
    pub admission_batch_size: usize,
    pub ready_queue_capacity: usize,
    pub placement_queue_capacity: usize,
    pub preemption_queue_capacity: usize,
}

impl Default for RmConfig {
    fn default() -> Self {
        Self {
            placing_timeout_ms: 600_000,
            launching_timeout_ms: 1_200_000,
            enable_placement_backoff: true,
            placement_retry_backoff_ms: 30_000,
            max_placement_retries: 3,
            backoff_policy: BackoffPolicyKind::Linear,
            event_buckets: 8,
            event_bucket_capacity: 1_000,
            preemption_period_ms: 60_000,
            entitlement_period_ms: 15_000,
            scheduling_period_ms: 100,
            timeout_sweep_period_ms: 100,
            admission_batch_size: 10,
            ready_queue_capacity: 10_000,
            placement_queue_capacity: 10_000,
            preemption_queue_capacity: 10_000,
        }
    }
}

impl RmConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_buckets == 0 {
            return Err(ConfigError::Invalid("event_buckets must be > 0".into()));
        }
        if self.event_bucket_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_bucket_capacity must be > 0".into(),
            ));
        }
        if self.ready_queue_capacity == 0
            || self.placement_queue_capacity == 0
            || self.preemption_queue_capacity == 0
        {
            return Err(ConfigError::Invalid("queue capacities must be > 0".into()));
        }
        Ok(())
    }

    pub fn placing_timeout(&self) -> Duration {
        Duration::from_millis(self.placing_timeout_ms)
    }

    pub fn launching_timeout(&self) -> Duration {
        Duration::from_millis(self.launching_timeout_ms)
    }

    pub fn placement_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.placement_retry_backoff_ms)
    }

    pub fn preemption_period(&self) -> Duration {
        Duration::from_millis(self.preemption_period_ms)
    }

    pub fn entitlement_period(&self) -> Duration {
        Duration::from_millis(self.entitlement_period_ms)
    }

    pub fn scheduling_period(&self) -> Duration {
        Duration::from_millis(self.scheduling_period_ms)
    }

    pub fn timeout_sweep_period(&self) -> Duration {
        Duration::from_millis(self.timeout_sweep_period_ms)
    }
}

/// Declarative description of one resource pool, nested into a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub id: String,
    /// Guaranteed floor; non-preemptible admission is bounded by it.
    #[serde(default)]
    pub reservation: Resources,
    /// Hard ceiling on entitlement.
    pub limit: Resources,
    /// Weight for dividing the parent's entitlement among siblings.
    #[serde(default = "default_share")]
    pub share: f64,
    #[serde(default)]
    pub policy: SchedulingPolicy,
    /// Fraction of entitlement reserved for controller tasks.
    #[serde(default = "default_controller_limit_share")]
    pub controller_limit_share: f64,
    /// Pools with preemption disabled are skipped by the ranker sweep.
    #[serde(default = "default_true")]
    pub preemptible: bool,
    #[serde(default)]
    pub children: Vec<PoolSpec>,
}

fn default_share() -> f64 {
    1.0
}

fn default_controller_limit_share() -> f64 {
    0.3
}

fn default_true() -> bool {
    true
}

impl PoolSpec {
    pub fn new(id: impl Into<String>, limit: Resources) -> Self {
        Self {
            id: id.into(),
            reservation: Resources::ZERO,
            limit,
            share: 1.0,
            policy: SchedulingPolicy::default(),
            controller_limit_share: default_controller_limit_share(),
            preemptible: true,
            children: Vec::new(),
        }
    }

    pub fn with_reservation(mut self, reservation: Resources) -> Self {
        self.reservation = reservation;
        self
    }

    pub fn with_share(mut self, share: f64) -> Self {
        self.share = share;
        self
    }

    pub fn with_child(mut self, child: PoolSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
