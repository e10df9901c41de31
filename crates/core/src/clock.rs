// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so time-driven behavior is testable.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Source of monotonic and wall-clock time.
///
/// Object-safe so live state (state machines, trackers) can hold
/// `Arc<dyn Clock>` without infecting every type with a generic parameter.
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for deadlines.
    fn now(&self) -> Instant;

    /// Milliseconds since the UNIX epoch, used for timestamps in records.
    fn epoch_ms(&self) -> u64;
}

/// Production clock backed by the system time sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests. Clones share the same offset.
#[derive(Debug, Clone)]
pub struct FakeClock {
    start: Instant,
    epoch_start_ms: u64,
    offset: Arc<Mutex<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            epoch_start_ms: 1_700_000_000_000,
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, d: Duration) {
        *self.offset.lock() += d;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }

    fn epoch_ms(&self) -> u64 {
        self.epoch_start_ms + self.offset.lock().as_millis() as u64
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
