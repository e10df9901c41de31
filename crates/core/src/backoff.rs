// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Placement-retry backoff policies.
//!
//! Each time a task is handed to a placement engine its retry count is
//! bumped and the PLACING timeout is stretched by the policy. Once the
//! policy reports a completed cycle, the next timeout readmits the task
//! (PENDING) instead of retrying placement (READY).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capability set every backoff policy exposes.
pub trait BackoffPolicy: Send + Sync {
    /// Extra time beyond the base placing timeout for the given retry.
    fn next_backoff(&self, retry_count: u32) -> Duration;

    /// True once the retry count has exhausted one placement cycle.
    fn is_cycle_completed(&self, retry_count: u32) -> bool;
}

/// Which policy the configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicyKind {
    #[default]
    Linear,
    Exponential,
}

/// Backoff grows by a fixed step per retry.
pub struct LinearBackoff {
    step: Duration,
    cycle: u32,
}

impl BackoffPolicy for LinearBackoff {
    fn next_backoff(&self, retry_count: u32) -> Duration {
        self.step * retry_count
    }

    fn is_cycle_completed(&self, retry_count: u32) -> bool {
        self.cycle > 0 && retry_count >= self.cycle
    }
}

/// Backoff doubles per retry, capped at 64x the step.
pub struct ExponentialBackoff {
    step: Duration,
    cycle: u32,
}

const EXPONENT_CAP: u32 = 6;

impl BackoffPolicy for ExponentialBackoff {
    fn next_backoff(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry_count - 1).min(EXPONENT_CAP);
        self.step * (1u32 << exponent)
    }

    fn is_cycle_completed(&self, retry_count: u32) -> bool {
        self.cycle > 0 && retry_count >= self.cycle
    }
}

/// Build the policy selected by configuration.
pub fn backoff_policy(kind: BackoffPolicyKind, step: Duration, cycle: u32) -> Arc<dyn BackoffPolicy> {
    match kind {
        BackoffPolicyKind::Linear => Arc::new(LinearBackoff { step, cycle }),
        BackoffPolicyKind::Exponential => Arc::new(ExponentialBackoff { step, cycle }),
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
