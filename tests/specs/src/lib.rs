// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for the coordination core's boundary scenarios (spec.md
//! §8). Unlike `crates/core`'s own unit tests, everything here goes
//! through `relaybus_core`'s *public* API only — no reaching into `Bus`
//! internals — the way `examples/groblegark-coop/tests/specs` drives the
//! real `coop` binary end to end rather than poking at its internals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use relaybus_core::{
    AgentHandle, Descriptor, FilterOutcome, OperationMode, ProcessOutcome, RetryBudget, Slots,
};

/// A configurable fixture agent that records every `process` call it
/// receives, optionally aggregates named slots, and can be told to fail
/// its first N attempts so retry scheduling can be observed.
pub struct RecordingAgent {
    name: String,
    modes: Vec<OperationMode>,
    slots: Vec<String>,
    calls: AtomicUsize,
    fails_remaining: AtomicU32,
    wait: Duration,
    seen: std::sync::Mutex<Vec<String>>,
}

impl RecordingAgent {
    pub fn new(name: impl Into<String>, modes: Vec<OperationMode>) -> Self {
        Self {
            name: name.into(),
            modes,
            slots: Vec::new(),
            calls: AtomicUsize::new(0),
            fails_remaining: AtomicU32::new(0),
            wait: Duration::from_secs(1),
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_slots(mut self, slots: &[&str]) -> Self {
        self.slots = slots.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_failures(mut self, n: u32, wait: Duration) -> Self {
        self.fails_remaining = AtomicU32::new(n);
        self.wait = wait;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn processed_selectors(&self) -> Vec<String> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl relaybus_core::Agent for RecordingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn operation_modes(&self) -> &[OperationMode] {
        &self.modes
    }

    fn slot_names(&self) -> &[String] {
        &self.slots
    }

    fn selector_filter(&self, selector: &str) -> FilterOutcome {
        if self.slots.is_empty() {
            return FilterOutcome::Accept;
        }
        let shape = selector.trim_start_matches('/').split('/').next().unwrap_or("");
        if self.slots.iter().any(|s| s == shape) {
            FilterOutcome::Slot(shape.to_owned())
        } else {
            FilterOutcome::Reject
        }
    }

    async fn process(&self, descriptor: &Descriptor, _from_id: &str, _slots: &Slots, _handle: &AgentHandle) -> ProcessOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).push(descriptor.selector.clone());

        if self.fails_remaining.load(Ordering::SeqCst) > 0 {
            self.fails_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(RetryBudget { retries: 2, wait: self.wait });
        }
        Ok(())
    }
}

/// Wraps a shared `Arc<RecordingAgent>` so the same instance can be both
/// joined (which takes ownership of an `Agent`) and inspected afterwards
/// (mirrors `crates/core/src/bus_tests.rs`'s `Shim`).
pub struct Shim(pub std::sync::Arc<RecordingAgent>);

#[async_trait]
impl relaybus_core::Agent for Shim {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn operation_modes(&self) -> &[OperationMode] {
        self.0.operation_modes()
    }
    fn slot_names(&self) -> &[String] {
        self.0.slot_names()
    }
    fn selector_filter(&self, selector: &str) -> FilterOutcome {
        self.0.selector_filter(selector)
    }
    async fn process(&self, descriptor: &Descriptor, from_id: &str, slots: &Slots, handle: &AgentHandle) -> ProcessOutcome {
        self.0.process(descriptor, from_id, slots, handle).await
    }
}

/// Build a bare-minimum descriptor with a null value, for tests that only
/// care about dispatch, not payload content.
pub fn descriptor(domain: &str, selector: &str, uuid: Uuid) -> Descriptor {
    Descriptor::new(domain, selector, uuid, selector, json!(null))
}

/// Let spawned tasks (notification delivery, the retry pump) catch up
/// before asserting on their side effects.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Per-agent `(processed, processable)` pair out of `processed_stats`.
pub fn stats_for(stats: &HashMap<String, (u64, u64)>, agent: &str) -> (u64, u64) {
    stats.get(agent).copied().unwrap_or((0, 0))
}
