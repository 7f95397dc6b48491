// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bus dispatcher (component D): the central coordinator agents join,
//! push descriptors through, and query. Owns the store, lock table, retry
//! scheduler, and cycle guard, and fans notifications out to every joined
//! agent runtime.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::Agent;
use crate::config;
use crate::cycle::CycleGuard;
use crate::descriptor::{Descriptor, Payload};
use crate::lock::LockTable;
use crate::retry::RetryScheduler;
use crate::runtime::{AgentRuntime, Notifiable};
use crate::store::{AgentKey, DescriptorStore};

/// Domain agents join without restriction; they see every push regardless
/// of which domain produced it (spec.md §4.E step 1).
pub const DEFAULT_DOMAIN: &str = "default";

struct JoinedAgent {
    agent_id: String,
    name: String,
    domain: String,
    notifiable: Arc<dyn Notifiable>,
    handle: AgentHandle,
}

/// Central coordinator. Always held behind an `Arc`; construct with
/// [`Bus::new`].
pub struct Bus {
    store: Arc<DescriptorStore>,
    locks: Arc<LockTable>,
    retry: Arc<RetryScheduler>,
    cycle_guard: CycleGuard,
    shutdown: CancellationToken,
    agents: RwLock<Vec<JoinedAgent>>,
    next_suffix: Mutex<HashMap<String, u64>>,
    request_counter: AtomicU64,
}

impl Bus {
    pub fn new() -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let (retry, fired_rx) = RetryScheduler::spawn(shutdown.clone());

        Arc::new_cyclic(|weak: &Weak<Bus>| {
            tokio::spawn(Self::pump_retries(weak.clone(), fired_rx));
            Bus {
                store: Arc::new(DescriptorStore::new()),
                locks: Arc::new(LockTable::new()),
                retry,
                cycle_guard: CycleGuard::new(),
                shutdown,
                agents: RwLock::new(Vec::new()),
                next_suffix: Mutex::new(HashMap::new()),
                request_counter: AtomicU64::new(0),
            }
        })
    }

    /// Cancel the retry scheduler, abandoning any pending re-injections.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn pump_retries(weak: Weak<Bus>, mut fired: tokio::sync::mpsc::UnboundedReceiver<crate::retry::RetryAction>) {
        while let Some(action) = fired.recv().await {
            let Some(bus) = weak.upgrade() else { return };
            bus.deliver_retry(action).await;
        }
    }

    async fn deliver_retry(&self, action: crate::retry::RetryAction) {
        let target = self
            .agents
            .read()
            .iter()
            .find(|j| j.agent_id == action.agent_id)
            .map(|j| (Arc::clone(&j.notifiable), j.handle.clone()));
        let Some((notifiable, handle)) = target else {
            return;
        };
        notifiable.deliver_retry(&action.from, &action.domain, &action.selector, action.request_id, &handle).await;
    }

    /// Register `agent`, restoring any persisted internal state, and
    /// return its bus-assigned id (`"<name>-<n>"`). Takes `bus` explicitly
    /// (rather than as a `&self` method) because the new agent's handle
    /// needs its own clone of the owning `Arc<Bus>`.
    pub async fn join<A: Agent + 'static>(bus: &Arc<Self>, agent: A, domain: impl Into<String>) -> String {
        let domain = domain.into();
        let name = agent.name().to_owned();

        let suffix = {
            let mut next = bus.next_suffix.lock();
            let counter = next.entry(name.clone()).or_insert(0);
            let n = *counter;
            *counter += 1;
            n
        };
        let agent_id = format!("{name}-{suffix}");

        let config = agent.config();
        let config_fp = config::fingerprint(&config);
        let output_fp = config::output_altering_fingerprint(&config, agent.output_altering_options());

        let runtime = Arc::new(AgentRuntime::new(
            agent,
            agent_id.clone(),
            domain.clone(),
            config_fp,
            output_fp.clone(),
            Arc::clone(&bus.store),
            Arc::clone(&bus.locks),
            Arc::clone(&bus.retry),
        ));

        let handle = AgentHandle {
            bus: Arc::clone(bus),
            agent_id: agent_id.clone(),
            agent_name: name.clone(),
            domain: domain.clone(),
            output_fp,
        };

        runtime.init(&handle).await;
        runtime.restore_state();
        let notifiable: Arc<dyn Notifiable> = runtime;

        bus.agents.write().push(JoinedAgent {
            agent_id: agent_id.clone(),
            name,
            domain,
            notifiable,
            handle,
        });

        info!(agent = %agent_id, "agent joined");
        agent_id
    }

    fn resolve_agent_name(&self, agent_id: &str) -> String {
        self.agents
            .read()
            .iter()
            .find(|j| j.agent_id == agent_id)
            .map(|j| j.name.clone())
            .unwrap_or_else(|| agent_id.to_owned())
    }

    /// Push `descriptor` on behalf of `from` (an agent id). Consults the
    /// cycle guard, then the store; on successful insertion, notifies every
    /// joined agent. Returns false on cycle rejection or duplicate.
    pub async fn push(&self, from: &str, descriptor: Descriptor) -> bool {
        let producing_agent = self.resolve_agent_name(from);
        if !self.cycle_guard.accepts(&descriptor, &producing_agent, &self.store) {
            return false;
        }

        let domain = descriptor.domain.clone();
        let uuid = descriptor.uuid;
        let selector = descriptor.selector.clone();

        if !self.store.add(descriptor) {
            return false;
        }

        let targets: Vec<(Arc<dyn Notifiable>, AgentHandle)> =
            self.agents.read().iter().map(|j| (Arc::clone(&j.notifiable), j.handle.clone())).collect();

        for (notifiable, handle) in targets {
            let agent_id = notifiable.agent_id().to_owned();
            let from = from.to_owned();
            let domain = domain.clone();
            let selector = selector.clone();
            let task = tokio::spawn(async move {
                notifiable.on_new_descriptor(&from, &domain, uuid, &selector, 0, &handle).await;
            });
            if let Err(err) = task.await {
                error!(agent = %agent_id, error = %err, "agent panicked while handling a new descriptor");
            }
        }

        true
    }

    pub fn get(&self, domain: &str, selector: &str) -> Option<Descriptor> {
        self.store.get_descriptor(domain, selector)
    }

    pub fn get_value(&self, domain: &str, selector: &str) -> Option<Payload> {
        self.store.get_value(domain, selector)
    }

    pub fn find(&self, domain: &str, selector_regex: &Regex, limit: Option<usize>, offset: usize) -> Vec<String> {
        self.store.find(domain, selector_regex, limit, offset)
    }

    pub fn find_by_selector(&self, domain: &str, prefix: &str, limit: Option<usize>, offset: usize) -> Vec<String> {
        self.store.find_by_selector(domain, prefix, limit, offset)
    }

    pub fn find_by_uuid(&self, domain: &str, uuid: Uuid) -> Vec<String> {
        self.store.find_by_uuid(domain, uuid)
    }

    pub fn find_by_value(&self, domain: &str, prefix: &str, value_regex: &Regex) -> Vec<String> {
        self.store.find_by_value(domain, prefix, value_regex)
    }

    pub fn list_uuids(&self, domain: &str) -> BTreeSet<Uuid> {
        self.store.list_uuids(domain)
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.agents.read().iter().map(|j| j.agent_id.clone()).collect()
    }

    pub fn processed_stats(&self, domain: &str) -> HashMap<String, (u64, u64)> {
        self.store.processed_stats(domain)
    }

    pub fn get_children(&self, domain: &str, selector: &str, recurse: bool) -> Vec<Descriptor> {
        self.store.get_children(domain, selector, recurse)
    }

    pub fn get_processable(&self, domain: &str, selector: &str) -> Vec<AgentKey> {
        self.store.get_processable(domain, selector)
    }

    fn mark_processed(&self, domain: &str, selector: &str, agent_name: &str, output_fp: &str) {
        self.store.mark_processed(domain, selector, agent_name, output_fp);
    }

    fn mark_processable(&self, domain: &str, selector: &str, agent_name: &str, output_fp: &str) {
        self.store.mark_processable(domain, selector, agent_name, output_fp);
    }

    fn lock(&self, lock_id: &str, domain: &str, selector: &str) -> bool {
        self.locks.lock(lock_id, domain, selector)
    }

    fn unlock(&self, lock_id: &str, domain: &str, selector: &str) {
        self.locks.unlock(lock_id, domain, selector, None);
    }

    fn store_internal_state(&self, agent_id: &str, bytes: Vec<u8>) {
        self.store.store_agent_state(agent_id, bytes);
    }

    fn load_internal_state(&self, agent_id: &str) -> Vec<u8> {
        self.store.load_agent_state(agent_id)
    }

    /// Increment the user-request counter and deliver `on_new_descriptor`
    /// (with the fresh counter as `request_id`) to every joined agent whose
    /// name is in `targets`.
    pub async fn request_processing(&self, agent_id: &str, domain: &str, selector: &str, targets: &[String]) -> u64 {
        let request_id = self.request_counter.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(descriptor) = self.store.get_descriptor(domain, selector) else {
            return request_id;
        };
        let uuid = descriptor.uuid;
        let wanted: HashSet<&str> = targets.iter().map(String::as_str).collect();

        let matches: Vec<(Arc<dyn Notifiable>, AgentHandle)> = self
            .agents
            .read()
            .iter()
            .filter(|j| wanted.contains(j.name.as_str()))
            .map(|j| (Arc::clone(&j.notifiable), j.handle.clone()))
            .collect();

        for (notifiable, handle) in matches {
            let agent_id_log = notifiable.agent_id().to_owned();
            let from = agent_id.to_owned();
            let domain = domain.to_owned();
            let selector = selector.to_owned();
            let task = tokio::spawn(async move {
                notifiable.on_new_descriptor(&from, &domain, uuid, &selector, request_id, &handle).await;
            });
            if let Err(err) = task.await {
                error!(agent = %agent_id_log, error = %err, "agent panicked while handling a processing request");
            }
        }

        request_id
    }

    /// Persist every joined agent's internal state to the store.
    pub fn persist_all(&self) {
        for joined in self.agents.read().iter() {
            joined.notifiable.persist_state();
        }
    }

    /// Start one worker per agent that overrides `run`, wait for all of
    /// them, then poll `on_idle` across every agent until a full pass makes
    /// no progress.
    pub async fn run_agents(&self) {
        let workers: Vec<(Arc<dyn Notifiable>, AgentHandle)> = self
            .agents
            .read()
            .iter()
            .filter(|j| j.notifiable.needs_worker())
            .map(|j| (Arc::clone(&j.notifiable), j.handle.clone()))
            .collect();

        let mut tasks = Vec::with_capacity(workers.len());
        for (notifiable, handle) in workers {
            tasks.push(tokio::spawn(async move {
                notifiable.run(&handle).await;
            }));
        }
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "agent worker panicked");
            }
        }

        loop {
            let drains: Vec<(Arc<dyn Notifiable>, AgentHandle)> =
                self.agents.read().iter().map(|j| (Arc::clone(&j.notifiable), j.handle.clone())).collect();

            let mut progressed = false;
            for (notifiable, handle) in drains {
                if notifiable.on_idle(&handle).await {
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }
}

/// The bus interface consumed by agents (spec.md §6), bound to one joined
/// agent's identity. Cheap to clone.
#[derive(Clone)]
pub struct AgentHandle {
    bus: Arc<Bus>,
    agent_id: String,
    agent_name: String,
    domain: String,
    output_fp: String,
}

impl AgentHandle {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub async fn push(&self, descriptor: Descriptor) -> bool {
        self.bus.push(&self.agent_id, descriptor).await
    }

    pub fn get(&self, domain: &str, selector: &str) -> Option<Descriptor> {
        self.bus.get(domain, selector)
    }

    pub fn get_value(&self, domain: &str, selector: &str) -> Option<Payload> {
        self.bus.get_value(domain, selector)
    }

    pub fn find(&self, domain: &str, selector_regex: &Regex, limit: Option<usize>, offset: usize) -> Vec<String> {
        self.bus.find(domain, selector_regex, limit, offset)
    }

    pub fn find_by_selector(&self, domain: &str, prefix: &str, limit: Option<usize>, offset: usize) -> Vec<String> {
        self.bus.find_by_selector(domain, prefix, limit, offset)
    }

    pub fn find_by_uuid(&self, domain: &str, uuid: Uuid) -> Vec<String> {
        self.bus.find_by_uuid(domain, uuid)
    }

    pub fn find_by_value(&self, domain: &str, prefix: &str, value_regex: &Regex) -> Vec<String> {
        self.bus.find_by_value(domain, prefix, value_regex)
    }

    pub fn list_uuids(&self, domain: &str) -> BTreeSet<Uuid> {
        self.bus.list_uuids(domain)
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.bus.list_agents()
    }

    pub fn mark_processed(&self, domain: &str, selector: &str) {
        self.bus.mark_processed(domain, selector, &self.agent_name, &self.output_fp);
    }

    pub fn mark_processable(&self, domain: &str, selector: &str) {
        self.bus.mark_processable(domain, selector, &self.agent_name, &self.output_fp);
    }

    pub fn get_processable(&self, domain: &str, selector: &str) -> Vec<AgentKey> {
        self.bus.get_processable(domain, selector)
    }

    pub fn processed_stats(&self, domain: &str) -> HashMap<String, (u64, u64)> {
        self.bus.processed_stats(domain)
    }

    pub fn get_children(&self, domain: &str, selector: &str, recurse: bool) -> Vec<Descriptor> {
        self.bus.get_children(domain, selector, recurse)
    }

    pub fn lock(&self, lock_id: &str, domain: &str, selector: &str) -> bool {
        self.bus.lock(lock_id, domain, selector)
    }

    pub fn unlock(&self, lock_id: &str, domain: &str, selector: &str) {
        self.bus.unlock(lock_id, domain, selector);
    }

    pub fn store_internal_state(&self, bytes: Vec<u8>) {
        self.bus.store_internal_state(&self.agent_id, bytes);
    }

    pub fn load_internal_state(&self) -> Vec<u8> {
        self.bus.load_internal_state(&self.agent_id)
    }

    pub async fn request_processing(&self, domain: &str, selector: &str, targets: &[String]) -> u64 {
        self.bus.request_processing(&self.agent_id, domain, selector, targets).await
    }

    /// Push a descriptor recording a link from `precursors` to a new
    /// selector in this agent's own domain, credited to this agent.
    /// Supplements the core's push primitive for agents that only ever
    /// relate existing descriptors rather than deriving new content.
    pub async fn declare_link(
        &self,
        uuid: Uuid,
        label: impl Into<String>,
        link_selector: impl Into<String>,
        precursors: Vec<String>,
        value: Payload,
    ) -> bool {
        let descriptor = Descriptor::new(self.domain.clone(), link_selector, uuid, label, value)
            .with_precursors(precursors)
            .with_credit(self.agent_name.clone());
        self.push(descriptor).await
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
