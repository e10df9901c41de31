// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes for tasks, jobs, pools and launch attempts.

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`,
/// `From<&str>`, `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>`
/// implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Stable identity of a task; does not change across launch attempts.
    pub struct TaskId;
}

define_id! {
    /// Identity of the job a task belongs to.
    pub struct JobId;
}

define_id! {
    /// Identity of a node in the resource-pool tree.
    pub struct PoolId;
}

define_id! {
    /// Per-launch-attempt identity (mesos-style). Rotates each time the
    /// task is handed a fresh launch attempt; stale status events are
    /// detected by comparing against the current value.
    pub struct AttemptId;
}

impl AttemptId {
    /// Generate a fresh attempt id for the given task.
    pub fn generate(task: &TaskId) -> Self {
        Self(format!("{}-{}", task.as_str(), uuid::Uuid::new_v4()))
    }
}

impl TaskId {
    /// Canonical task id for an instance of a job.
    pub fn for_instance(job: &JobId, instance: u32) -> Self {
        Self(format!("{}-{}", job.as_str(), instance))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
