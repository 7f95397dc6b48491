// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The descriptor store (component A): an in-memory, content-addressed
//! store of descriptors plus the per-agent processing-state bookkeeping
//! spec.md §3 describes.
//!
//! A single [`parking_lot::RwLock`] guards all mutable state. Every
//! operation here is a fast in-memory map lookup, never an await point, so
//! holding the lock for the duration of one call keeps the "single logical
//! write is atomic with respect to concurrent readers" guarantee (spec.md
//! §4.A) without ever blocking across a suspension point.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use uuid::Uuid;

use crate::descriptor::{Descriptor, DescriptorKey, Payload};

/// Per-agent processing marker. Transitions are monotone: `Unseen ->
/// Processable -> Processed`, or `Unseen -> Processed` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMarker {
    Unseen,
    Processable,
    Processed,
}

impl ProcessingMarker {
    fn advance_to_processable(self) -> Self {
        match self {
            Self::Unseen => Self::Processable,
            // Processable -> Processable is a no-op; Processed -> Processable
            // is the one conflicting transition spec.md §4.A calls out as
            // silently ignored.
            other => other,
        }
    }

    fn advance_to_processed(self) -> Self {
        Self::Processed
    }
}

/// Key identifying one agent's processing state for a descriptor:
/// (agent_name, output-altering config fingerprint).
pub type AgentKey = (String, String);

#[derive(Default)]
struct Inner {
    descriptors: IndexMap<DescriptorKey, Descriptor>,
    /// precursor selector -> selectors of descriptors naming it as a precursor
    children: HashMap<DescriptorKey, Vec<DescriptorKey>>,
    uuids: HashMap<String, BTreeSet<Uuid>>,
    state: HashMap<DescriptorKey, HashMap<AgentKey, ProcessingMarker>>,
    agent_state: HashMap<String, Vec<u8>>,
}

/// In-memory descriptor store. Durability is explicitly not provided —
/// [`DescriptorStore::supports_persisted_state`] always returns `false`;
/// agent state survives only for the life of the process, which is enough
/// for the bus's own "restore on join" contract but not across restarts.
pub struct DescriptorStore {
    inner: RwLock<Inner>,
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }

    /// Insert `descriptor` if (domain, selector) is new. Returns `true` on
    /// insertion, `false` on duplicate (not an error — spec.md §7).
    pub fn add(&self, descriptor: Descriptor) -> bool {
        let key = DescriptorKey::from(&descriptor);
        let mut inner = self.inner.write();
        if inner.descriptors.contains_key(&key) {
            return false;
        }

        inner.uuids.entry(descriptor.domain.clone()).or_default().insert(descriptor.uuid);
        for precursor in &descriptor.precursors {
            let pkey = DescriptorKey::new(descriptor.domain.clone(), precursor.clone());
            inner.children.entry(pkey).or_default().push(key.clone());
        }
        inner.descriptors.insert(key, descriptor);
        true
    }

    pub fn get_descriptor(&self, domain: &str, selector: &str) -> Option<Descriptor> {
        let key = DescriptorKey::new(domain, selector);
        self.inner.read().descriptors.get(&key).cloned()
    }

    pub fn get_value(&self, domain: &str, selector: &str) -> Option<Payload> {
        self.get_descriptor(domain, selector).map(|d| d.value)
    }

    /// Selectors in `domain` matching `selector_regex`, in stable (insertion)
    /// order, paginated by `offset`/`limit` (`limit = None` means unlimited).
    pub fn find(
        &self,
        domain: &str,
        selector_regex: &Regex,
        limit: Option<usize>,
        offset: usize,
    ) -> Vec<String> {
        let inner = self.inner.read();
        let matches = inner
            .descriptors
            .values()
            .filter(|d| d.domain == domain && selector_regex.is_match(&d.selector))
            .map(|d| d.selector.clone());
        paginate(matches, limit, offset)
    }

    pub fn find_by_selector(
        &self,
        domain: &str,
        selector_prefix: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Vec<String> {
        let inner = self.inner.read();
        let matches = inner
            .descriptors
            .values()
            .filter(|d| d.domain == domain && d.selector.starts_with(selector_prefix))
            .map(|d| d.selector.clone());
        paginate(matches, limit, offset)
    }

    pub fn find_by_uuid(&self, domain: &str, uuid: Uuid) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .descriptors
            .values()
            .filter(|d| d.domain == domain && d.uuid == uuid)
            .map(|d| d.selector.clone())
            .collect()
    }

    pub fn find_by_value(
        &self,
        domain: &str,
        selector_prefix: &str,
        value_regex: &Regex,
    ) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .descriptors
            .values()
            .filter(|d| {
                d.domain == domain
                    && d.selector.starts_with(selector_prefix)
                    && value_regex.is_match(&d.value_text())
            })
            .map(|d| d.selector.clone())
            .collect()
    }

    pub fn list_uuids(&self, domain: &str) -> BTreeSet<Uuid> {
        self.inner.read().uuids.get(domain).cloned().unwrap_or_default()
    }

    /// Monotone transition to `Processable`. A conflicting `Processed ->
    /// Processable` transition is silently ignored.
    pub fn mark_processable(&self, domain: &str, selector: &str, agent_name: &str, config_fp: &str) {
        let key = DescriptorKey::new(domain, selector);
        let agent_key = (agent_name.to_owned(), config_fp.to_owned());
        let mut inner = self.inner.write();
        let marker = inner.state.entry(key).or_default().entry(agent_key).or_insert(ProcessingMarker::Unseen);
        *marker = marker.advance_to_processable();
    }

    pub fn mark_processed(&self, domain: &str, selector: &str, agent_name: &str, config_fp: &str) {
        let key = DescriptorKey::new(domain, selector);
        let agent_key = (agent_name.to_owned(), config_fp.to_owned());
        let mut inner = self.inner.write();
        let marker = inner.state.entry(key).or_default().entry(agent_key).or_insert(ProcessingMarker::Unseen);
        *marker = marker.advance_to_processed();
    }

    pub fn get_processable(&self, domain: &str, selector: &str) -> Vec<AgentKey> {
        let key = DescriptorKey::new(domain, selector);
        let inner = self.inner.read();
        inner
            .state
            .get(&key)
            .into_iter()
            .flat_map(|agents| agents.iter())
            .filter(|(_, marker)| **marker == ProcessingMarker::Processable)
            .map(|(agent_key, _)| agent_key.clone())
            .collect()
    }

    /// `agent_name -> (processed_count, processable_count)`, aggregated
    /// across every config fingerprint that agent has used in `domain`.
    pub fn processed_stats(&self, domain: &str) -> HashMap<String, (u64, u64)> {
        let inner = self.inner.read();
        let mut stats: HashMap<String, (u64, u64)> = HashMap::new();
        for (key, agents) in &inner.state {
            if key.domain != domain {
                continue;
            }
            for ((agent_name, _config_fp), marker) in agents {
                let entry = stats.entry(agent_name.clone()).or_default();
                match marker {
                    ProcessingMarker::Processed => entry.0 += 1,
                    ProcessingMarker::Processable => entry.1 += 1,
                    ProcessingMarker::Unseen => {}
                }
            }
        }
        stats
    }

    /// Descriptors whose precursor list contains `selector`. When `recurse`
    /// is true, follows precursor edges transitively.
    pub fn get_children(&self, domain: &str, selector: &str, recurse: bool) -> Vec<Descriptor> {
        let inner = self.inner.read();
        let root = DescriptorKey::new(domain, selector);
        let mut seen = BTreeSet::new();
        let mut frontier = vec![root];
        let mut out = Vec::new();

        while let Some(key) = frontier.pop() {
            let Some(direct) = inner.children.get(&key) else { continue };
            for child_key in direct {
                if !seen.insert(child_key.clone()) {
                    continue;
                }
                if let Some(descriptor) = inner.descriptors.get(child_key) {
                    out.push(descriptor.clone());
                }
                if recurse {
                    frontier.push(child_key.clone());
                }
            }
        }
        out
    }

    pub fn store_agent_state(&self, agent_name: &str, bytes: Vec<u8>) {
        self.inner.write().agent_state.insert(agent_name.to_owned(), bytes);
    }

    pub fn load_agent_state(&self, agent_name: &str) -> Vec<u8> {
        self.inner.read().agent_state.get(agent_name).cloned().unwrap_or_default()
    }

    /// Whether this store promises agent state survives process restarts.
    /// The in-memory store never does.
    pub fn supports_persisted_state(&self) -> bool {
        false
    }
}

fn paginate(
    items: impl Iterator<Item = String>,
    limit: Option<usize>,
    offset: usize,
) -> Vec<String> {
    let skipped = items.skip(offset);
    match limit {
        Some(n) => skipped.take(n).collect(),
        None => skipped.collect(),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
