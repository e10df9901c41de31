// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applies task status updates to the tracker.
//!
//! Only RUNNING and terminal reports matter to the manager; everything
//! else is acknowledged and dropped. Reports for a stale attempt are
//! dropped too, so a late event from a previous launch cannot finish the
//! current one.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use muster_core::{StatusEvent, TaskState, TransitOptions};
use muster_engine::Tracker;

use crate::events::{ProcessError, StatusProcessor};

type Listener = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

pub struct StatusUpdateProcessor {
    tracker: Arc<Tracker>,
    listeners: Vec<Listener>,
}

impl StatusUpdateProcessor {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self {
            tracker,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }
}

#[async_trait]
impl StatusProcessor for StatusUpdateProcessor {
    async fn process_status_update(&self, event: &StatusEvent) -> Result<(), ProcessError> {
        if event.state != TaskState::Running && !event.state.is_terminal() {
            return Ok(());
        }

        let Some(rm_task) = self.tracker.get_task(&event.task_id) else {
            debug!(task = %event.task_id, "status update for unknown task");
            return Ok(());
        };
        if rm_task.attempt() != event.attempt {
            info!(
                task = %event.task_id,
                attempt = %event.attempt,
                "status update for a stale attempt; dropping"
            );
            return Ok(());
        }

        if event.state == TaskState::Running {
            if let Err(err) = rm_task.transit_to(
                TaskState::Running,
                TransitOptions::with_reason("task reported running"),
            ) {
                warn!(task = %event.task_id, %err, "cannot move task to RUNNING");
            }
            return Ok(());
        }

        // Terminal: release resources and drop the task.
        let from = rm_task.current_state();
        self.tracker
            .mark_it_done(&event.task_id, &event.attempt)
            .map_err(|err| ProcessError::Permanent(err.to_string()))?;
        self.tracker.counters().increment(event.state);
        info!(
            task = %event.task_id,
            state = %event.state,
            %from,
            "task completed and removed from the tracker"
        );
        Ok(())
    }

    fn process_listeners(&self, event: &StatusEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
