// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent runtime (component E): wraps a concrete [`Agent`] with the
//! notification state machine spec.md §4.E describes — mode handling,
//! slot aggregation, the filter chain, locking around `process`, and
//! internal-state persistence. The bus only ever talks to the
//! [`Notifiable`] object this module produces; it never touches the wrapped
//! `Agent` directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::{Agent, FilterOutcome, OperationMode, RetryBudget, Slots};
use crate::bus::{AgentHandle, DEFAULT_DOMAIN};
use crate::lock::{FailedUnlock, LockTable, RetryDecision};
use crate::retry::{RetryAction, RetryScheduler};
use crate::store::DescriptorStore;

/// Type-erased handle the bus holds for every joined agent.
#[async_trait]
pub trait Notifiable: Send + Sync {
    fn agent_id(&self) -> &str;
    fn agent_name(&self) -> &str;
    fn config_fingerprint(&self) -> &str;
    fn needs_worker(&self) -> bool;

    /// Run the wrapped agent's `init` hook. Called once, right after join,
    /// before internal state is restored (spec.md §4.E).
    async fn init(&self, handle: &AgentHandle);

    async fn on_new_descriptor(
        &self,
        from: &str,
        domain: &str,
        uuid: Uuid,
        selector: &str,
        request_id: u64,
        handle: &AgentHandle,
    );

    /// Redeliver a single previously-filtered (agent, descriptor) tuple
    /// straight to `call_process`, bypassing the filter chain a second
    /// time. Used by the retry scheduler's re-injection path.
    async fn deliver_retry(&self, from: &str, domain: &str, selector: &str, request_id: u64, handle: &AgentHandle);

    async fn on_idle(&self, handle: &AgentHandle) -> bool;

    async fn run(&self, handle: &AgentHandle);

    fn persist_state(&self);
    fn restore_state(&self);
}

struct IdleEntry {
    from: String,
    domain: String,
    uuid: Uuid,
    selector: String,
    request_id: u64,
}

/// What the runtime hands the store as the persisted-state blob: the
/// agent's own opaque bytes paired with the pending-slots map (spec.md §3).
#[derive(Serialize, Deserialize, Default)]
struct PersistedState {
    internal: Vec<u8>,
    pending_slots: HashMap<Uuid, HashMap<String, String>>,
}

pub struct AgentRuntime<A: Agent> {
    agent: A,
    agent_id: String,
    bound_domain: String,
    config_fp: String,
    output_fp: String,
    mode: OperationMode,
    store: Arc<DescriptorStore>,
    locks: Arc<LockTable>,
    retry: Arc<RetryScheduler>,
    pending_slots: Mutex<HashMap<Uuid, HashMap<String, String>>>,
    idle_queue: Mutex<Vec<IdleEntry>>,
}

impl<A: Agent> AgentRuntime<A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: A,
        agent_id: String,
        bound_domain: String,
        config_fp: String,
        output_fp: String,
        store: Arc<DescriptorStore>,
        locks: Arc<LockTable>,
        retry: Arc<RetryScheduler>,
    ) -> Self {
        let mode = resolve_mode(&agent);
        Self {
            agent,
            agent_id,
            bound_domain,
            config_fp,
            output_fp,
            mode,
            store,
            locks,
            retry,
            pending_slots: Mutex::new(HashMap::new()),
            idle_queue: Mutex::new(Vec::new()),
        }
    }

    fn mark_processed(&self, domain: &str, selector: &str) {
        self.store.mark_processed(domain, selector, self.agent.name(), &self.output_fp);
    }

    fn mark_processable(&self, domain: &str, selector: &str) {
        self.store.mark_processable(domain, selector, self.agent.name(), &self.output_fp);
    }

    async fn dispatch(
        &self,
        from: &str,
        domain: &str,
        uuid: Uuid,
        selector: &str,
        request_id: u64,
        handle: &AgentHandle,
    ) {
        // 1. Domain restriction: agents joined on the default domain see
        // every push; agents bound to a specific domain only see theirs.
        if self.bound_domain != DEFAULT_DOMAIN && domain != self.bound_domain {
            self.mark_processed(domain, selector);
            return;
        }

        // 2. Selector filter, with slot resolution folded in.
        let outcome = self.agent.selector_filter(selector);
        let slot_name = match outcome {
            FilterOutcome::Reject => {
                self.mark_processed(domain, selector);
                return;
            }
            FilterOutcome::Accept => None,
            FilterOutcome::Slot(name) => Some(name),
        };

        if let Some(slot) = slot_name {
            let declared = self.agent.slot_names();
            let complete = {
                let mut pending = self.pending_slots.lock();
                let entry = pending.entry(uuid).or_default();
                entry.insert(slot, selector.to_owned());
                declared.iter().all(|name| entry.contains_key(name))
            };
            if !complete {
                self.mark_processable(domain, selector);
                return;
            }
            // Full slot set collected: fall through to mode handling below,
            // using this (the completing) selector as the trigger.
        }

        // 4. Interactive mode waits for an explicit request.
        if self.mode == OperationMode::Interactive && request_id == 0 {
            self.mark_processable(domain, selector);
            return;
        }

        // 5. Idle mode defers to the drain loop.
        if self.mode == OperationMode::Idle {
            self.mark_processable(domain, selector);
            self.idle_queue.lock().push(IdleEntry {
                from: from.to_owned(),
                domain: domain.to_owned(),
                uuid,
                selector: selector.to_owned(),
                request_id,
            });
            return;
        }

        self.call_process(from, domain, uuid, selector, request_id, handle).await;
    }

    /// Resolve the declared slot selectors for `uuid`, in `slot_names()`
    /// order. Empty when this agent has no slots declared.
    fn resolve_slots(&self, uuid: Uuid) -> HashMap<String, String> {
        self.pending_slots.lock().get(&uuid).cloned().unwrap_or_default()
    }

    async fn call_process(
        &self,
        from: &str,
        domain: &str,
        uuid: Uuid,
        selector: &str,
        request_id: u64,
        handle: &AgentHandle,
    ) {
        let declared = self.agent.slot_names();
        let slot_selectors = self.resolve_slots(uuid);

        let lock_id = format!("{}\u{1f}{}\u{1f}{}", self.agent.name(), self.output_fp, request_id);
        let lock_selector = if declared.is_empty() {
            selector.to_owned()
        } else {
            declared.iter().map(|name| slot_selectors.get(name).map(String::as_str).unwrap_or("?")).collect::<Vec<_>>().join("?")
        };

        if !self.locks.lock(&lock_id, domain, &lock_selector) {
            // Another instance of this agent is already processing this
            // lock key; silently stand down.
            return;
        }

        let resolved: Vec<(String, crate::descriptor::Descriptor)> = if declared.is_empty() {
            match self.store.get_descriptor(domain, selector) {
                Some(d) => vec![(selector.to_owned(), d)],
                None => {
                    warn!(agent = %self.agent_id, domain, selector, "descriptor vanished before processing");
                    self.locks.unlock(&lock_id, domain, &lock_selector, None);
                    return;
                }
            }
        } else {
            let mut out = Vec::with_capacity(declared.len());
            for name in declared {
                let Some(sel) = slot_selectors.get(name) else {
                    warn!(agent = %self.agent_id, slot = name, "slot incomplete at call_process");
                    self.locks.unlock(&lock_id, domain, &lock_selector, None);
                    return;
                };
                match self.store.get_descriptor(domain, sel) {
                    Some(d) => out.push((name.clone(), d)),
                    None => {
                        warn!(agent = %self.agent_id, slot = name, selector = sel, "slot descriptor vanished before processing");
                        self.locks.unlock(&lock_id, domain, &lock_selector, None);
                        return;
                    }
                }
            }
            out
        };

        let slots = Slots(resolved.iter().map(|(name, d)| (name.clone(), d.clone())).collect());
        // `primary` is the descriptor that triggered this call: the lone
        // resolved descriptor for non-slot agents, or the slot member whose
        // selector just completed the set.
        let primary = resolved
            .iter()
            .find(|(_, d)| d.selector == selector)
            .map(|(_, d)| d.clone())
            .unwrap_or_else(|| resolved[0].1.clone());

        let touched: Vec<String> = resolved.iter().map(|(_, d)| d.selector.clone()).collect();

        if !self.agent.descriptor_filter(&primary, &slots) {
            for sel in &touched {
                self.mark_processed(domain, sel);
            }
            self.locks.unlock(&lock_id, domain, &lock_selector, None);
            return;
        }

        match self.agent.process(&primary, from, &slots, handle).await {
            Ok(()) => {
                for sel in &touched {
                    self.mark_processed(domain, sel);
                }
                self.locks.unlock(&lock_id, domain, &lock_selector, None);
            }
            Err(RetryBudget { retries, wait }) => {
                let decision = self.locks.unlock(
                    &lock_id,
                    domain,
                    &lock_selector,
                    Some(FailedUnlock {
                        agent_name: self.agent.name(),
                        output_config_fp: &self.output_fp,
                        budget: retries,
                        wait,
                    }),
                );
                match decision {
                    Some(RetryDecision::Schedule { wait, .. }) => {
                        self.retry.schedule(
                            RetryAction {
                                agent_id: self.agent_id.clone(),
                                from: from.to_owned(),
                                domain: domain.to_owned(),
                                selector: selector.to_owned(),
                                request_id,
                            },
                            wait,
                        );
                    }
                    Some(RetryDecision::Exhausted) => {
                        debug!(agent = %self.agent_id, domain, selector, "retry budget exhausted, giving up");
                    }
                    None => {}
                }
            }
        }
    }
}

fn resolve_mode<A: Agent>(agent: &A) -> OperationMode {
    let modes = agent.operation_modes();
    let requested = agent
        .config()
        .get("operationmode")
        .and_then(|v| v.as_str())
        .and_then(OperationMode::parse);

    match requested {
        Some(mode) if modes.contains(&mode) => mode,
        _ => modes.first().copied().unwrap_or(OperationMode::Automatic),
    }
}

#[async_trait]
impl<A: Agent + 'static> Notifiable for AgentRuntime<A> {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn agent_name(&self) -> &str {
        self.agent.name()
    }

    fn config_fingerprint(&self) -> &str {
        &self.config_fp
    }

    fn needs_worker(&self) -> bool {
        self.agent.needs_worker()
    }

    async fn init(&self, handle: &AgentHandle) {
        self.agent.init(handle).await;
    }

    async fn on_new_descriptor(
        &self,
        from: &str,
        domain: &str,
        uuid: Uuid,
        selector: &str,
        request_id: u64,
        handle: &AgentHandle,
    ) {
        self.dispatch(from, domain, uuid, selector, request_id, handle).await;
    }

    async fn deliver_retry(&self, from: &str, domain: &str, selector: &str, request_id: u64, handle: &AgentHandle) {
        let Some(descriptor) = self.store.get_descriptor(domain, selector) else {
            debug!(agent = %self.agent_id, domain, selector, "retry target vanished, dropping");
            return;
        };
        self.call_process(from, domain, descriptor.uuid, selector, request_id, handle).await;
    }

    async fn on_idle(&self, handle: &AgentHandle) -> bool {
        if self.mode != OperationMode::Idle {
            return false;
        }
        let queued: Vec<IdleEntry> = std::mem::take(&mut *self.idle_queue.lock());
        if queued.is_empty() {
            return false;
        }
        for entry in queued {
            self.call_process(&entry.from, &entry.domain, entry.uuid, &entry.selector, entry.request_id, handle).await;
        }
        true
    }

    async fn run(&self, handle: &AgentHandle) {
        if let Err(err) = self.agent.run(handle).await {
            warn!(agent = %self.agent_id, error = %err, "agent run() returned an error");
        }
    }

    fn persist_state(&self) {
        let internal = self.agent.get_internal_state().unwrap_or_default();
        let pending_slots = self.pending_slots.lock().clone();
        let state = PersistedState { internal, pending_slots };
        if let Ok(bytes) = serde_json::to_vec(&state) {
            self.store.store_agent_state(&self.agent_id, bytes);
        }
    }

    fn restore_state(&self) {
        let bytes = self.store.load_agent_state(&self.agent_id);
        if bytes.is_empty() {
            return;
        }
        let Ok(state) = serde_json::from_slice::<PersistedState>(&bytes) else {
            warn!(agent = %self.agent_id, "failed to decode persisted agent state, starting fresh");
            return;
        };
        *self.pending_slots.lock() = state.pending_slots;
        if !state.internal.is_empty() {
            self.agent.set_internal_state(state.internal);
        }
    }
}

impl OperationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "automatic" => Some(Self::Automatic),
            "interactive" => Some(Self::Interactive),
            "idle" => Some(Self::Idle),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
