// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic rule-driven state machine.
//!
//! A machine is built once from a set of transition rules and timeout
//! rules and is immutable afterwards, except for the per-state timeout
//! duration which the placement-backoff path updates in place. The owner
//! is expected to guard the machine with its own lock; `transit_to`
//! commits a transition and returns it, and callbacks are fetched with
//! `callbacks_for` so the owner can run them after releasing that lock.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;

/// Bound for state label types.
pub trait State: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> State for T where T: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {}

/// Bounds KILLED → PENDING reschedule loops; oldest records are dropped.
const MAX_HISTORY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError<S: State> {
    #[error("{machine}: invalid transition from {from} to {to}")]
    InvalidTransition { machine: String, from: S, to: S },
    #[error("{machine}: no rule declared for state {from}")]
    NoRule { machine: String, from: S },
    #[error("{machine}: no timeout rule for state {state}")]
    NoTimeoutRule { machine: String, state: S },
    #[error("invalid state machine definition: {0}")]
    Build(String),
    #[error("{machine}: callback failed during {from} -> {to}: {message}")]
    Callback {
        machine: String,
        from: S,
        to: S,
        message: String,
    },
}

/// A committed (or, inside a pre-callback, an about-to-commit) transition.
#[derive(Debug, Clone)]
pub struct Transition<S> {
    /// Name of the machine (the task id).
    pub machine: String,
    pub from: S,
    pub to: S,
    pub reason: String,
    pub info: HashMap<String, String>,
    /// True when driven by a timeout rule rather than an explicit call.
    pub timed_out: bool,
}

/// Optional reason and info attached to a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitOptions {
    pub reason: Option<String>,
    pub info: HashMap<String, String>,
}

impl TransitOptions {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            info: HashMap::new(),
        }
    }

    pub fn info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }
}

/// Post-commit callback. Errors are reported to the caller but the
/// transition stays committed.
pub type TransitionCallback<S> = Arc<dyn Fn(&Transition<S>) -> Result<(), String> + Send + Sync>;

/// Pre-commit callback for timeout rules; may retarget `transition.to`
/// within the rule's declared set.
pub type RetargetCallback<S> = Arc<dyn Fn(&mut Transition<S>) -> Result<(), String> + Send + Sync>;

/// Declares the exact set of destinations reachable from one state.
#[derive(Clone)]
pub struct Rule<S> {
    from: S,
    to: Vec<S>,
    callback: Option<TransitionCallback<S>>,
}

impl<S: State> Rule<S> {
    pub fn new(from: S, to: impl Into<Vec<S>>) -> Self {
        Self {
            from,
            to: to.into(),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: TransitionCallback<S>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn from(&self) -> S {
        self.from
    }

    pub fn to(&self) -> &[S] {
        &self.to
    }
}

/// A timer-driven rule: after `timeout` in `from`, the machine moves to
/// the first target unless the pre-callback retargets it.
#[derive(Clone)]
pub struct TimeoutRule<S> {
    from: S,
    to: Vec<S>,
    timeout: Duration,
    pre_callback: Option<RetargetCallback<S>>,
    callback: Option<TransitionCallback<S>>,
}

impl<S: State> TimeoutRule<S> {
    pub fn new(from: S, to: impl Into<Vec<S>>, timeout: Duration) -> Self {
        Self {
            from,
            to: to.into(),
            timeout,
            pre_callback: None,
            callback: None,
        }
    }

    pub fn with_pre_callback(mut self, pre: RetargetCallback<S>) -> Self {
        self.pre_callback = Some(pre);
        self
    }

    pub fn with_callback(mut self, callback: TransitionCallback<S>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// One line of the machine's transition history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord<S> {
    pub from: S,
    pub to: S,
    pub reason: String,
    pub at_ms: u64,
}

/// Observes every committed transition; implementations feed metrics,
/// counters and event streams.
pub trait TransitionObserver<S>: Send + Sync {
    fn observe(&self, transition: &Transition<S>);
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<S> TransitionObserver<S> for NoopObserver {
    fn observe(&self, _transition: &Transition<S>) {}
}

pub struct Builder<S: State> {
    name: String,
    initial: S,
    rules: Vec<Rule<S>>,
    timeout_rules: Vec<TimeoutRule<S>>,
    transition_callback: Option<TransitionCallback<S>>,
}

impl<S: State> Builder<S> {
    pub fn new(name: impl Into<String>, initial: S) -> Self {
        Self {
            name: name.into(),
            initial,
            rules: Vec::new(),
            timeout_rules: Vec::new(),
            transition_callback: None,
        }
    }

    pub fn add_rule(mut self, rule: Rule<S>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rules(mut self, rules: impl IntoIterator<Item = Rule<S>>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn add_timeout_rule(mut self, rule: TimeoutRule<S>) -> Self {
        self.timeout_rules.push(rule);
        self
    }

    /// Callback invoked for every committed transition, after any
    /// rule-specific callback.
    pub fn with_transition_callback(mut self, callback: TransitionCallback<S>) -> Self {
        self.transition_callback = Some(callback);
        self
    }

    pub fn build(self, clock: &dyn Clock) -> Result<StateMachine<S>, StateMachineError<S>> {
        let mut rules = HashMap::new();
        for rule in self.rules {
            if rule.to.is_empty() {
                return Err(StateMachineError::Build(format!(
                    "rule from {} has no destinations",
                    rule.from
                )));
            }
            if rules.insert(rule.from, rule).is_some() {
                return Err(StateMachineError::Build(
                    "duplicate rule for one from-state".to_string(),
                ));
            }
        }
        let mut timeout_rules = HashMap::new();
        for rule in self.timeout_rules {
            if rule.to.is_empty() {
                return Err(StateMachineError::Build(format!(
                    "timeout rule from {} has no destinations",
                    rule.from
                )));
            }
            if timeout_rules.insert(rule.from, rule).is_some() {
                return Err(StateMachineError::Build(
                    "duplicate timeout rule for one from-state".to_string(),
                ));
            }
        }
        Ok(StateMachine {
            name: self.name,
            current: self.initial,
            reason: String::new(),
            last_update_ms: clock.epoch_ms(),
            entered_at: clock.now(),
            rules,
            timeout_rules,
            transition_callback: self.transition_callback,
            history: Vec::new(),
        })
    }
}

pub struct StateMachine<S: State> {
    name: String,
    current: S,
    reason: String,
    last_update_ms: u64,
    /// When the current state was entered; anchors the timeout deadline.
    entered_at: Instant,
    rules: HashMap<S, Rule<S>>,
    timeout_rules: HashMap<S, TimeoutRule<S>>,
    transition_callback: Option<TransitionCallback<S>>,
    history: Vec<TransitionRecord<S>>,
}

impl<S: State> StateMachine<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> S {
        self.current
    }

    /// Reason attached to the most recent transition.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms
    }

    pub fn history(&self) -> &[TransitionRecord<S>] {
        &self.history
    }

    /// Deadline of the current state's timeout rule, if one applies.
    pub fn deadline(&self) -> Option<Instant> {
        self.timeout_rules
            .get(&self.current)
            .map(|rule| self.entered_at + rule.timeout)
    }

    /// True once the current state's timeout rule is due.
    pub fn timed_out(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Update the timeout duration of the rule anchored at `from`. The
    /// placement-backoff path stretches the PLACING rule this way.
    pub fn set_timeout(&mut self, from: S, timeout: Duration) -> Result<(), StateMachineError<S>> {
        match self.timeout_rules.get_mut(&from) {
            Some(rule) => {
                rule.timeout = timeout;
                Ok(())
            }
            None => Err(StateMachineError::NoTimeoutRule {
                machine: self.name.clone(),
                state: from,
            }),
        }
    }

    /// Commit a transition to `to`. Fails with `InvalidTransition` and no
    /// effect if `to` is not in the current state's declared set.
    pub fn transit_to(
        &mut self,
        to: S,
        opts: TransitOptions,
        clock: &dyn Clock,
    ) -> Result<Transition<S>, StateMachineError<S>> {
        let from = self.current;
        let rule = self
            .rules
            .get(&from)
            .ok_or_else(|| StateMachineError::NoRule {
                machine: self.name.clone(),
                from,
            })?;
        if !rule.to.contains(&to) {
            return Err(StateMachineError::InvalidTransition {
                machine: self.name.clone(),
                from,
                to,
            });
        }

        let transition = Transition {
            machine: self.name.clone(),
            from,
            to,
            reason: opts.reason.unwrap_or_default(),
            info: opts.info,
            timed_out: false,
        };
        self.commit(&transition, clock);
        Ok(transition)
    }

    /// Fire the current state's timeout rule if due. Returns `Ok(None)`
    /// when nothing is due. The pre-callback runs before commit and may
    /// retarget within the rule's declared set.
    pub fn fire_timeout(
        &mut self,
        clock: &dyn Clock,
    ) -> Result<Option<Transition<S>>, StateMachineError<S>> {
        if !self.timed_out(clock.now()) {
            return Ok(None);
        }
        let from = self.current;
        let rule = self
            .timeout_rules
            .get(&from)
            .ok_or_else(|| StateMachineError::NoTimeoutRule {
                machine: self.name.clone(),
                state: from,
            })?;

        let mut transition = Transition {
            machine: self.name.clone(),
            from,
            to: rule.to[0],
            reason: format!("{from} timed out"),
            info: HashMap::new(),
            timed_out: true,
        };
        if let Some(pre) = rule.pre_callback.clone() {
            pre(&mut transition).map_err(|message| StateMachineError::Callback {
                machine: self.name.clone(),
                from,
                to: transition.to,
                message,
            })?;
        }
        let allowed = self
            .timeout_rules
            .get(&from)
            .map(|r| r.to.contains(&transition.to))
            .unwrap_or(false);
        if !allowed {
            return Err(StateMachineError::InvalidTransition {
                machine: self.name.clone(),
                from,
                to: transition.to,
            });
        }
        self.commit(&transition, clock);
        Ok(Some(transition))
    }

    /// Callbacks to run for a committed transition, cloned out so the
    /// owner can invoke them after dropping its lock around the machine.
    pub fn callbacks_for(&self, transition: &Transition<S>) -> Vec<TransitionCallback<S>> {
        let mut callbacks = Vec::new();
        let rule_callback = if transition.timed_out {
            self.timeout_rules
                .get(&transition.from)
                .and_then(|r| r.callback.clone())
        } else {
            self.rules
                .get(&transition.from)
                .and_then(|r| r.callback.clone())
        };
        if let Some(cb) = rule_callback {
            callbacks.push(cb);
        }
        if let Some(cb) = self.transition_callback.clone() {
            callbacks.push(cb);
        }
        callbacks
    }

    fn commit(&mut self, transition: &Transition<S>, clock: &dyn Clock) {
        self.current = transition.to;
        self.reason = transition.reason.clone();
        self.last_update_ms = clock.epoch_ms();
        self.entered_at = clock.now();
        if self.history.len() == MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(TransitionRecord {
            from: transition.from,
            to: transition.to,
            reason: transition.reason.clone(),
            at_ms: self.last_update_ms,
        });
    }
}

impl<S: State> fmt::Debug for StateMachine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("current", &self.current)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "statemachine_tests.rs"]
mod tests;
