// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Agent` trait: the hooks a concrete agent implementation provides.
//! This is deliberately thin — mode handling, slot aggregation, filtering
//! order, locking, and internal-state persistence all live in
//! [`crate::runtime::AgentRuntime`], which wraps an `Agent` and is the
//! thing the bus actually talks to (spec.md §9: "dynamic registration...
//! becomes explicit construction").

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::AgentHandle;
use crate::descriptor::Descriptor;

/// One of the three operation modes spec.md §2/GLOSSARY defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Automatic,
    Interactive,
    Idle,
}

/// Outcome of `selector_filter`: whether this agent is interested in a
/// selector and, for slot-collecting agents, which slot it fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Reject,
    Accept,
    Slot(String),
}

/// Slot selectors resolved to their descriptors, as passed to
/// `descriptor_filter` and `process` for slot-collecting agents.
#[derive(Debug, Clone, Default)]
pub struct Slots(pub HashMap<String, Descriptor>);

impl Slots {
    pub fn get(&self, slot: &str) -> Option<&Descriptor> {
        self.0.get(slot)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Retry parameters an agent chooses when `process` fails.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    pub retries: u32,
    pub wait: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self { retries: 0, wait: Duration::from_secs(0) }
    }
}

/// Result of one `process` invocation.
pub type ProcessOutcome = Result<(), RetryBudget>;

/// Result of an agent's long-running `run` entry (non-consuming agents).
pub type RunOutcome = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// The hooks a concrete agent provides. See spec.md §4.E and §6.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent name (combined with a join-order suffix to form the
    /// bus-assigned agent id).
    fn name(&self) -> &str;

    /// Supported operation modes, default first (spec.md §3).
    fn operation_modes(&self) -> &[OperationMode];

    /// Slot names this agent aggregates before processing. Empty means no
    /// slot aggregation.
    fn slot_names(&self) -> &[String] {
        &[]
    }

    /// Explicit output-altering option names. `None` means every config key
    /// except `operationmode` is output-altering (spec.md §3).
    fn output_altering_options(&self) -> Option<&[String]> {
        None
    }

    /// The agent's full configuration, as handed to the fingerprinting
    /// machinery in [`crate::config`].
    fn config(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    /// Called once, after the agent has joined the bus but before its
    /// internal state is restored. `handle` is this agent's bound channel
    /// back into the bus (spec.md §6) and is the same handle passed to
    /// every later hook.
    async fn init(&self, _handle: &AgentHandle) {}

    /// Whether this agent overrides `run` and needs a dedicated worker
    /// task (spec.md §4.D: "one worker per agent whose runtime overrides
    /// the run entry point").
    fn needs_worker(&self) -> bool {
        false
    }

    fn selector_filter(&self, _selector: &str) -> FilterOutcome {
        FilterOutcome::Accept
    }

    fn descriptor_filter(&self, _descriptor: &Descriptor, _slots: &Slots) -> bool {
        true
    }

    async fn process(
        &self,
        _descriptor: &Descriptor,
        _from_id: &str,
        _slots: &Slots,
        _handle: &AgentHandle,
    ) -> ProcessOutcome {
        Ok(())
    }

    /// Long-running entry point for agents that do not consume descriptors.
    async fn run(&self, _handle: &AgentHandle) -> RunOutcome {
        Ok(())
    }

    /// Opaque internal state to persist at shutdown. `None` means nothing
    /// to persist.
    fn get_internal_state(&self) -> Option<Vec<u8>> {
        None
    }

    /// Restore previously persisted internal state.
    fn set_internal_state(&self, _state: Vec<u8>) {}
}
