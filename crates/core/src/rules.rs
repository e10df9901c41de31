// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical transition table for task state machines.
//!
//! The engine builds each task's machine from this table, attaching its
//! own timeout pre-callbacks. Destination sets are exact: anything not
//! listed is an invalid transition.

use std::time::Duration;

use crate::state::TaskState;
use crate::statemachine::{Rule, TimeoutRule};

use TaskState::*;

/// The full rule set for a task, INITIALIZED onward.
///
/// INITIALIZED reaches RUNNING / LAUNCHING / LAUNCHED only while priming
/// in-flight tasks at startup; the tracker gates those targets behind its
/// recovery flag.
pub fn task_rules() -> Vec<Rule<TaskState>> {
    vec![
        Rule::new(Initialized, [Pending, Running, Launching, Launched]),
        Rule::new(Pending, [Ready, Placed, Killed]),
        Rule::new(Ready, [Placing, Placed, Pending, Killed]),
        Rule::new(Placing, [Ready, Placed, Pending, Killed]),
        Rule::new(Placed, [Launching, Killed]),
        Rule::new(Launching, [Running, Launched, Ready, Killed]),
        Rule::new(Launched, [Running, Ready, Launched, Killed]),
        Rule::new(
            Running,
            [Succeeded, Failed, Lost, Killing, Killed, Preempting, Ready],
        ),
        Rule::new(Failed, [Ready]),
        Rule::new(Killed, [Pending]),
    ]
}

/// PLACING times out toward READY, or PENDING once the placement cycle
/// is complete; the pre-callback chooses between them.
pub fn placing_timeout_rule(timeout: Duration) -> TimeoutRule<TaskState> {
    TimeoutRule::new(Placing, [Ready, Pending], timeout)
}

/// LAUNCHING times out back toward READY.
pub fn launching_timeout_rule(timeout: Duration) -> TimeoutRule<TaskState> {
    TimeoutRule::new(Launching, [Ready], timeout)
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
