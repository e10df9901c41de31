// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Semantic resource vector: cpu, memory, disk, gpu.
//!
//! All pool accounting (demand, allocation, entitlement, slack) and
//! admission checks are expressed over this type. Subtraction floors at
//! zero so counters can never go negative.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Resources {
    /// CPU cores (fractional).
    pub cpu: f64,
    /// Memory in MiB.
    pub mem_mb: f64,
    /// Disk in MiB.
    pub disk_mb: f64,
    /// GPU units.
    pub gpu: f64,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        cpu: 0.0,
        mem_mb: 0.0,
        disk_mb: 0.0,
        gpu: 0.0,
    };

    pub fn new(cpu: f64, mem_mb: f64, disk_mb: f64, gpu: f64) -> Self {
        Self {
            cpu,
            mem_mb,
            disk_mb,
            gpu,
        }
    }

    /// Convenience for the common cpu+mem case.
    pub fn cpu_mem(cpu: f64, mem_mb: f64) -> Self {
        Self {
            cpu,
            mem_mb,
            ..Self::ZERO
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Component-wise `self <= other`.
    pub fn fits_within(&self, other: &Resources) -> bool {
        self.cpu <= other.cpu
            && self.mem_mb <= other.mem_mb
            && self.disk_mb <= other.disk_mb
            && self.gpu <= other.gpu
    }

    /// Component-wise scale by a non-negative factor.
    pub fn scale(&self, factor: f64) -> Resources {
        Resources {
            cpu: self.cpu * factor,
            mem_mb: self.mem_mb * factor,
            disk_mb: self.disk_mb * factor,
            gpu: self.gpu * factor,
        }
    }

    /// Component-wise minimum.
    pub fn min(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu.min(other.cpu),
            mem_mb: self.mem_mb.min(other.mem_mb),
            disk_mb: self.disk_mb.min(other.disk_mb),
            gpu: self.gpu.min(other.gpu),
        }
    }

    /// Component-wise maximum.
    pub fn max(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu.max(other.cpu),
            mem_mb: self.mem_mb.max(other.mem_mb),
            disk_mb: self.disk_mb.max(other.disk_mb),
            gpu: self.gpu.max(other.gpu),
        }
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            cpu: self.cpu + rhs.cpu,
            mem_mb: self.mem_mb + rhs.mem_mb,
            disk_mb: self.disk_mb + rhs.disk_mb,
            gpu: self.gpu + rhs.gpu,
        }
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        *self = *self + rhs;
    }
}

impl Sub for Resources {
    type Output = Resources;

    /// Component-wise subtraction, floored at zero.
    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            cpu: (self.cpu - rhs.cpu).max(0.0),
            mem_mb: (self.mem_mb - rhs.mem_mb).max(0.0),
            disk_mb: (self.disk_mb - rhs.disk_mb).max(0.0),
            gpu: (self.gpu - rhs.gpu).max(0.0),
        }
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, rhs: Resources) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu:{} mem:{}MiB disk:{}MiB gpu:{}",
            self.cpu, self.mem_mb, self.disk_mb, self.gpu
        )
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
