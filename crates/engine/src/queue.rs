// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded blocking multi-producer / multi-consumer FIFO queue.
//!
//! Backs the ready queues, the placements queue and the preemption
//! candidate queue. Dequeue blocks up to a caller-supplied timeout and
//! returns `None` on expiry; `enqueue_head` puts an item back at the
//! front when an admission has to be rolled back.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Returned when the queue is at capacity; carries the rejected item so
/// the caller can roll it back.
pub struct QueueFull<T>(pub T);

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is full")
    }
}

impl<T> std::error::Error for QueueFull<T> {}

pub struct Queue<T> {
    name: String,
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Queue<T> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Append to the tail; fails without blocking when at capacity.
    pub fn enqueue(&self, item: T) -> Result<(), QueueFull<T>> {
        {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                return Err(QueueFull(item));
            }
            items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Put an item back at the head. Rollbacks are allowed to exceed
    /// capacity by one so an admission reversal can never be lost.
    pub fn enqueue_head(&self, item: T) {
        self.items.lock().push_front(item);
        self.notify.notify_one();
    }

    /// Pop the head without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Pop the head, blocking up to `timeout`; `None` when it expires
    /// with the queue still empty.
    pub async fn dequeue(&self, timeout: Duration) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Arm the waiter before checking so a concurrent enqueue
            // between check and await cannot be missed.
            let notified = self.notify.notified();
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }
            match tokio::time::timeout_at(deadline, notified).await {
                Ok(()) => continue,
                Err(_) => return self.try_dequeue(),
            }
        }
    }
}

impl<T: Clone> Queue<T> {
    /// Snapshot of up to `limit` items from the head, in order.
    pub fn peek(&self, limit: usize) -> Vec<T> {
        self.items.lock().iter().take(limit).cloned().collect()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
