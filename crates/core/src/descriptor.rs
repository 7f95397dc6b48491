// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The descriptor: the immutable, content-addressed unit of work that
//! flows through the bus.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque payload carried by a descriptor. The core never interprets this —
/// it is read and written by agents only.
pub type Payload = serde_json::Value;

/// An immutable artifact, globally identified by (domain, selector) and
/// grouped into lineages by [`Uuid`].
///
/// Descriptors are created by [`crate::bus::Bus::push`] and never mutated
/// afterwards; the store only ever records processing *state* alongside
/// them (see [`crate::store::DescriptorStore`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub domain: String,
    pub selector: String,
    pub uuid: Uuid,
    pub label: String,
    pub value: Payload,
    /// Names of agents that produced or touched this descriptor.
    pub agent_credits: BTreeSet<String>,
    /// Selectors of immediate ancestors within the same UUID lineage.
    pub precursors: Vec<String>,
    /// Processing duration in seconds. `None` is the "unmeasured" sentinel.
    pub processing_time: Option<f64>,
}

impl Descriptor {
    pub fn new(
        domain: impl Into<String>,
        selector: impl Into<String>,
        uuid: Uuid,
        label: impl Into<String>,
        value: Payload,
    ) -> Self {
        Self {
            domain: domain.into(),
            selector: selector.into(),
            uuid,
            label: label.into(),
            value,
            agent_credits: BTreeSet::new(),
            precursors: Vec::new(),
            processing_time: None,
        }
    }

    pub fn with_precursors(mut self, precursors: Vec<String>) -> Self {
        self.precursors = precursors;
        self
    }

    pub fn with_credit(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_credits.insert(agent_name.into());
        self
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = Some(seconds);
        self
    }

    /// The leading path segment of the selector (e.g. `/raw/%AAAA` -> `raw`).
    ///
    /// Used by the cycle guard to compare "selector shape" across
    /// generations without depending on descriptor content.
    pub fn selector_type(&self) -> &str {
        selector_type(&self.selector)
    }

    /// Render the payload as text for `find_by_value` regex matching.
    /// Strings are matched raw; anything else is matched against its
    /// compact JSON rendering.
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

pub fn selector_type(selector: &str) -> &str {
    let trimmed = selector.strip_prefix('/').unwrap_or(selector);
    match trimmed.find('/') {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    }
}

/// Unique key identifying a descriptor within the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorKey {
    pub domain: String,
    pub selector: String,
}

impl DescriptorKey {
    pub fn new(domain: impl Into<String>, selector: impl Into<String>) -> Self {
        Self { domain: domain.into(), selector: selector.into() }
    }
}

impl From<&Descriptor> for DescriptorKey {
    fn from(d: &Descriptor) -> Self {
        Self::new(d.domain.clone(), d.selector.clone())
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
