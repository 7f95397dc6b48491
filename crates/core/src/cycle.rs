// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The cycle guard (component F): a stateless check over a candidate
//! descriptor's precursor DAG, run before store insertion.
//!
//! spec.md §9 flags the source's own threshold as imprecise and fixes it
//! at "more than two matching ancestors in the same UUID lineage", exposed
//! as a tunable. Since the descriptor data model (spec.md §3) has no
//! per-descriptor config fingerprint to compare — only a set of credited
//! agent names — "matching ancestor" here is defined as: same UUID lineage,
//! same selector type (spec.md's "selector shape"), and the *pushing*
//! agent's name among the ancestor's `agent_credits`. Ancestor lookups
//! assume precursor selectors live in the same domain as the candidate.
//!
//! A candidate is also rejected if its own selector already appears among
//! its transitive precursors — pushing it would close a cycle back onto
//! itself.

use crate::descriptor::Descriptor;
use crate::store::DescriptorStore;

pub const DEFAULT_MAX_MATCHING_ANCESTORS: usize = 2;

#[derive(Debug, Clone)]
pub struct CycleGuard {
    max_matching_ancestors: usize,
}

impl Default for CycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleGuard {
    pub fn new() -> Self {
        Self { max_matching_ancestors: DEFAULT_MAX_MATCHING_ANCESTORS }
    }

    pub fn with_max_matching_ancestors(max_matching_ancestors: usize) -> Self {
        Self { max_matching_ancestors }
    }

    /// Returns `true` if `candidate`, about to be pushed by `producing_agent`,
    /// should be accepted into the store.
    pub fn accepts(&self, candidate: &Descriptor, producing_agent: &str, store: &DescriptorStore) -> bool {
        let ancestors = self.walk_ancestors(candidate, store);

        if ancestors.iter().any(|a| a.selector == candidate.selector) {
            return false;
        }

        let shape = candidate.selector_type();
        let matching = ancestors
            .iter()
            .filter(|a| a.uuid == candidate.uuid)
            .filter(|a| a.selector_type() == shape)
            .filter(|a| a.agent_credits.contains(producing_agent))
            .count();

        matching <= self.max_matching_ancestors
    }

    /// Transitive closure of `candidate`'s precursors, within `candidate`'s
    /// domain.
    fn walk_ancestors(&self, candidate: &Descriptor, store: &DescriptorStore) -> Vec<Descriptor> {
        let mut seen = std::collections::HashSet::new();
        let mut frontier: Vec<String> = candidate.precursors.clone();
        let mut out = Vec::new();

        while let Some(selector) = frontier.pop() {
            if !seen.insert(selector.clone()) {
                continue;
            }
            let Some(ancestor) = store.get_descriptor(&candidate.domain, &selector) else { continue };
            frontier.extend(ancestor.precursors.clone());
            out.push(ancestor);
        }
        out
    }
}

#[cfg(test)]
#[path = "cycle_tests.rs"]
mod tests;
