// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The lock table (component B) plus the retry counters spec.md §3 keys on
//! (agent-name, agent-output-config, domain, selector).
//!
//! This is the only synchronization primitive agents see. Double-locking
//! the same key is impossible by contract — locks are not reentrant — and
//! `unlock` on an unknown key is a no-op (spec.md §4.B).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

/// (lock_id, domain, selector)
pub type LockKey = (String, String, String);

/// (agent_name, output_config_fp, domain, selector)
pub type RetryKey = (String, String, String, String);

#[derive(Default)]
struct Inner {
    locks: HashSet<LockKey>,
    retries: HashMap<RetryKey, u32>,
}

/// Outcome of a failed `unlock`, telling the caller whether (and when) to
/// re-inject the (agent, descriptor) tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry budget exhausted (or never positive) — give up silently.
    Exhausted,
    /// Schedule a re-injection after `wait`. `remaining` is the retry
    /// budget left *after* this attempt.
    Schedule { wait: Duration, remaining: u32 },
}

pub struct LockTable {
    inner: Mutex<Inner>,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Atomically test-and-set (lock_id, domain, selector). Returns `true`
    /// on successful acquisition, `false` if already held.
    pub fn lock(&self, lock_id: &str, domain: &str, selector: &str) -> bool {
        let key = (lock_id.to_owned(), domain.to_owned(), selector.to_owned());
        let mut inner = self.inner.lock();
        if inner.locks.contains(&key) {
            return false;
        }
        inner.locks.insert(key);
        true
    }

    /// Release (lock_id, domain, selector) if held. On unknown locks this is
    /// a no-op. When `failure` is `Some`, consults and updates the retry
    /// counter for `retry_key` and reports what the caller should do next.
    pub fn unlock(
        &self,
        lock_id: &str,
        domain: &str,
        selector: &str,
        failure: Option<FailedUnlock>,
    ) -> Option<RetryDecision> {
        let key = (lock_id.to_owned(), domain.to_owned(), selector.to_owned());
        let mut inner = self.inner.lock();
        inner.locks.remove(&key);

        let failure = failure?;
        let retry_key: RetryKey = (
            failure.agent_name.to_owned(),
            failure.output_config_fp.to_owned(),
            domain.to_owned(),
            selector.to_owned(),
        );
        // The counter is never removed once initialized: a zero entry must
        // stay zero forever, so a later failed unlock for the same tuple
        // hits the "give up silently" branch instead of re-initializing
        // from the budget and retrying indefinitely.
        let counter = inner.retries.entry(retry_key).or_insert(failure.budget);
        if *counter == 0 {
            return Some(RetryDecision::Exhausted);
        }
        *counter -= 1;
        let remaining = *counter;
        Some(RetryDecision::Schedule { wait: failure.wait, remaining })
    }
}

/// Parameters describing a failed `process` attempt, supplied to `unlock`.
pub struct FailedUnlock<'a> {
    pub agent_name: &'a str,
    pub output_config_fp: &'a str,
    pub budget: u32,
    pub wait: Duration,
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
