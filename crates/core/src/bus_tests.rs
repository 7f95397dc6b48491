// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as PMutex;
use serde_json::json;
use uuid::Uuid;

use super::*;
use crate::agent::{FilterOutcome, OperationMode, ProcessOutcome, RetryBudget, Slots};

struct RecordingAgent {
    name: String,
    modes: Vec<OperationMode>,
    slots: Vec<String>,
    calls: AtomicUsize,
    fails_remaining: AtomicU32,
    wait: Duration,
    log: PMutex<Vec<String>>,
}

impl RecordingAgent {
    fn new(name: &str, modes: Vec<OperationMode>) -> Self {
        Self {
            name: name.to_owned(),
            modes,
            slots: Vec::new(),
            calls: AtomicUsize::new(0),
            fails_remaining: AtomicU32::new(0),
            wait: Duration::from_secs(1),
            log: PMutex::new(Vec::new()),
        }
    }

    fn with_slots(mut self, slots: &[&str]) -> Self {
        self.slots = slots.iter().map(|s| s.to_string()).collect();
        self
    }

    fn with_failures(mut self, n: u32, wait: Duration) -> Self {
        self.fails_remaining = AtomicU32::new(n);
        self.wait = wait;
        self
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for RecordingAgent {
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
        let shape = crate::descriptor::selector_type(selector);
        if self.slots.iter().any(|s| s == shape) {
            FilterOutcome::Slot(shape.to_owned())
        } else {
            FilterOutcome::Reject
        }
    }

    async fn process(&self, descriptor: &Descriptor, _from_id: &str, slots: &Slots, _handle: &AgentHandle) -> ProcessOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(descriptor.selector.clone());
        let _ = &slots.0;

        if self.fails_remaining.load(Ordering::SeqCst) > 0 {
            self.fails_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(RetryBudget { retries: 2, wait: self.wait });
        }
        Ok(())
    }
}

/// Wraps a shared `RecordingAgent` so the same instance can be both joined
/// (which takes ownership of an `Agent`) and inspected afterwards.
struct Shim(Arc<RecordingAgent>);

#[async_trait]
impl Agent for Shim {
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

fn descriptor(domain: &str, selector: &str, uuid: Uuid) -> Descriptor {
    Descriptor::new(domain, selector, uuid, selector, json!(null))
}

/// Let the background retry-scheduler and pump tasks catch up with a
/// `tokio::time::advance` before asserting on their side effects.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn duplicate_push_notifies_once() {
    let bus = Bus::new();
    let agent = RecordingAgent::new("ls", vec![OperationMode::Automatic]);
    let agent_id = Bus::join(&bus, agent, DEFAULT_DOMAIN).await;

    let uuid = Uuid::new_v4();
    assert!(bus.push(&agent_id, descriptor("bin", "/raw/%AAAA", uuid)).await);
    assert!(!bus.push(&agent_id, descriptor("bin", "/raw/%AAAA", uuid)).await);

    let stats = bus.processed_stats("bin");
    let (processed, _) = stats.get("ls").copied().unwrap_or((0, 0));
    assert_eq!(processed, 1);
}

#[tokio::test]
async fn interactive_mode_waits_for_explicit_request() {
    let bus = Bus::new();
    let agent = Arc::new(RecordingAgent::new("printer", vec![OperationMode::Interactive]));
    let agent_id = Bus::join(&bus, Shim(Arc::clone(&agent)), DEFAULT_DOMAIN).await;

    let uuid = Uuid::new_v4();
    assert!(bus.push(&agent_id, descriptor("bin", "/raw/%AAAA", uuid)).await);
    assert_eq!(agent.call_count(), 0);
    let processable = bus.get_processable("bin", "/raw/%AAAA");
    assert!(processable.iter().any(|(name, _)| name == "printer"));

    let request_id = bus.request_processing(&agent_id, "bin", "/raw/%AAAA", &["printer".to_owned()]).await;
    assert_eq!(request_id, 1);
    assert_eq!(agent.call_count(), 1);
}

#[tokio::test]
async fn slot_aggregation_locks_once_and_processes_both() {
    let bus = Bus::new();
    let agent = RecordingAgent::new("joiner", vec![OperationMode::Automatic]).with_slots(&["a", "b"]);
    let agent_id = Bus::join(&bus, agent, DEFAULT_DOMAIN).await;

    let uuid = Uuid::new_v4();
    assert!(bus.push(&agent_id, descriptor("bin", "/a/%AAAA", uuid)).await);
    let processable = bus.get_processable("bin", "/a/%AAAA");
    assert!(processable.iter().any(|(name, _)| name == "joiner"));

    assert!(bus.push(&agent_id, descriptor("bin", "/b/%BBBB", uuid)).await);

    let stats = bus.processed_stats("bin");
    let (processed, _) = stats.get("joiner").copied().unwrap_or((0, 0));
    assert_eq!(processed, 2);
}

#[tokio::test(start_paused = true)]
async fn retry_reschedules_twice_then_gives_up() {
    let bus = Bus::new();
    let agent = Arc::new(RecordingAgent::new("flaky", vec![OperationMode::Automatic]).with_failures(u32::MAX, Duration::from_secs(1)));
    let agent_id = Bus::join(&bus, Shim(Arc::clone(&agent)), DEFAULT_DOMAIN).await;

    let uuid = Uuid::new_v4();
    assert!(bus.push(&agent_id, descriptor("bin", "/raw/%AAAA", uuid)).await);
    assert_eq!(agent.call_count(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(agent.call_count(), 2);

    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(agent.call_count(), 3);

    // Budget of 2 retries is now exhausted; advancing further must not
    // trigger a fourth attempt.
    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(agent.call_count(), 3);

    let stats = bus.processed_stats("bin");
    let (processed, _) = stats.get("flaky").copied().unwrap_or((0, 0));
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn cycle_guard_rejects_excess_matching_ancestors() {
    let bus = Bus::new();
    let agent = RecordingAgent::new("derive", vec![OperationMode::Automatic]);
    let agent_id = Bus::join(&bus, agent, DEFAULT_DOMAIN).await;

    let uuid = Uuid::new_v4();
    let mut prev = None;
    for i in 0..3 {
        let selector = format!("/parsed/%{i:04}");
        let mut d = descriptor("bin", &selector, uuid).with_credit("derive");
        if let Some(p) = prev {
            d = d.with_precursors(vec![p]);
        }
        assert!(bus.push(&agent_id, d).await);
        prev = Some(selector);
    }

    let candidate = descriptor("bin", "/parsed/%9999", uuid).with_precursors(vec![prev.unwrap()]);
    assert!(!bus.push(&agent_id, candidate).await);
}

#[tokio::test]
async fn idle_drain_processes_all_queued_on_first_pass_then_reports_no_progress() {
    let bus = Bus::new();
    let agent = RecordingAgent::new("collector", vec![OperationMode::Idle]);
    let agent_id = Bus::join(&bus, agent, DEFAULT_DOMAIN).await;

    for i in 0..5 {
        let uuid = Uuid::new_v4();
        let selector = format!("/raw/%{i:04}");
        assert!(bus.push(&agent_id, descriptor("bin", &selector, uuid)).await);
    }

    let (notifiable, handle) = {
        let joined = bus.agents.read();
        let j = joined.iter().find(|j| j.agent_id == agent_id).unwrap();
        (Arc::clone(&j.notifiable), j.handle.clone())
    };

    assert!(notifiable.on_idle(&handle).await);
    assert!(!notifiable.on_idle(&handle).await);

    let stats = bus.processed_stats("bin");
    let (processed, _) = stats.get("collector").copied().unwrap_or((0, 0));
    assert_eq!(processed, 5);
}
