// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fatal-only error type for the core.
//!
//! Every *recoverable* outcome in spec.md §7 — duplicate insert, missing
//! descriptor, filter rejection, lock contention, an agent exception during
//! notification or `process` — is represented as a `bool`/`Option` return or
//! a logged-and-swallowed panic, never an `Err`. This type exists only for
//! the two genuinely fatal cases spec.md §7 names: failing to start a worker
//! task, and failing to acquire an internal lock.

use thiserror::Error;

/// Fatal failure surfaced to the caller of [`crate::bus::Bus::run_agents`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to start worker for agent {agent_id}: {source}")]
    WorkerSpawn { agent_id: String, #[source] source: std::io::Error },

    #[error("internal lock poisoned: {context}")]
    LockPoisoned { context: &'static str },
}

impl Error {
    /// Short, machine-stable tag, mirroring the teacher's `ErrorCode::as_str`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkerSpawn { .. } => "WORKER_SPAWN_FAILED",
            Self::LockPoisoned { .. } => "LOCK_POISONED",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
