// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bucketed task-status event processor.
//!
//! Events are sharded over N buckets by `instance mod N`, so all events
//! for one instance serialize through one consumer. Each bucket buffers
//! events ordered by stream offset and its consumer applies them
//! smallest-first; transient downstream failures retry after a fixed
//! short backoff, permanent ones are logged and skipped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use muster_core::StatusEvent;

use crate::protocol::SvcError;

/// Time between retries of a transiently failing status update.
const RETRY_BACKOFF: Duration = Duration::from_millis(1);

/// Downstream failure classification; transient errors are retried.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

/// Seam to the component that applies a status update to the state
/// machines.
#[async_trait]
pub trait StatusProcessor: Send + Sync {
    async fn process_status_update(&self, event: &StatusEvent) -> Result<(), ProcessError>;

    /// Invoked after a successful (or skipped-permanent) update.
    fn process_listeners(&self, event: &StatusEvent);
}

struct Bucket {
    index: usize,
    capacity: usize,
    /// Pending events keyed by offset; the consumer drains smallest
    /// first. Offsets are unique stream-wide.
    pending: Mutex<BTreeMap<u64, StatusEvent>>,
    data_ready: Notify,
    space_free: Notify,
    processed_count: AtomicU64,
    processed_offset: AtomicU64,
}

impl Bucket {
    fn new(index: usize, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            index,
            capacity,
            pending: Mutex::new(BTreeMap::new()),
            data_ready: Notify::new(),
            space_free: Notify::new(),
            processed_count: AtomicU64::new(0),
            processed_offset: AtomicU64::new(0),
        })
    }

    async fn push(&self, event: StatusEvent) {
        loop {
            let wait = self.space_free.notified();
            {
                let mut pending = self.pending.lock();
                if pending.len() < self.capacity {
                    pending.insert(event.offset, event);
                    self.data_ready.notify_one();
                    return;
                }
            }
            wait.await;
        }
    }

    fn pop(&self) -> Option<StatusEvent> {
        let mut pending = self.pending.lock();
        let event = pending.pop_first().map(|(_, e)| e);
        if event.is_some() {
            self.space_free.notify_one();
        }
        event
    }
}

async fn consume_bucket(
    bucket: Arc<Bucket>,
    processor: Arc<dyn StatusProcessor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let wait = bucket.data_ready.notified();
        let Some(event) = bucket.pop() else {
            tokio::select! {
                () = wait => continue,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
        };

        loop {
            match processor.process_status_update(&event).await {
                Ok(()) => break,
                Err(ProcessError::Transient(message)) => {
                    debug!(bucket = bucket.index, offset = event.offset, message,
                        "transient status failure; retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(ProcessError::Permanent(message)) => {
                    error!(bucket = bucket.index, offset = event.offset, message,
                        "permanent status failure; skipping event");
                    break;
                }
            }
        }

        processor.process_listeners(&event);
        bucket.processed_count.fetch_add(1, Ordering::Relaxed);
        bucket
            .processed_offset
            .fetch_max(event.offset, Ordering::Relaxed);
    }
    info!(bucket = bucket.index, "event bucket stopped");
}

/// The sharded pipeline. Construct, then `start` to spawn consumers;
/// events accepted before `start` sit buffered in offset order.
pub struct EventProcessor {
    buckets: Vec<Arc<Bucket>>,
    processor: Arc<dyn StatusProcessor>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl EventProcessor {
    pub fn new(
        processor: Arc<dyn StatusProcessor>,
        bucket_count: usize,
        bucket_capacity: usize,
    ) -> Self {
        let buckets = (0..bucket_count.max(1))
            .map(|i| Bucket::new(i, bucket_capacity))
            .collect();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            buckets,
            processor,
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one consumer task per bucket.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }
        for bucket in &self.buckets {
            handles.push(tokio::spawn(consume_bucket(
                Arc::clone(bucket),
                Arc::clone(&self.processor),
                self.shutdown_rx.clone(),
            )));
        }
    }

    /// Route an event to its instance's bucket, waiting when the bucket
    /// buffer is full.
    pub async fn add_event(&self, event: StatusEvent) -> Result<(), SvcError> {
        let index = event.instance as usize % self.buckets.len();
        self.buckets[index].push(event).await;
        Ok(())
    }

    /// Purge watermark: the maximum processed offset across buckets.
    pub fn event_progress(&self) -> u64 {
        self.buckets
            .iter()
            .map(|b| b.processed_offset.load(Ordering::Relaxed))
            .max()
            .unwrap_or(0)
    }

    /// Total events fully processed.
    pub fn processed_count(&self) -> u64 {
        self.buckets
            .iter()
            .map(|b| b.processed_count.load(Ordering::Relaxed))
            .sum()
    }

    /// Events still buffered across buckets.
    pub fn backlog(&self) -> usize {
        self.buckets.iter().map(|b| b.pending.lock().len()).sum()
    }

    /// Stop all consumers after their in-flight event commits.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
