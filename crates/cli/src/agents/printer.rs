// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `printer`: prints descriptor values whose selector matches one of
//! several regexes. Grounded on
//! `examples/original_source/rebus/agents/return.py` ("return"), but joins
//! in `interactive` mode (SPEC_FULL.md) so printing only happens once a
//! caller explicitly requests it via `request_processing`.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use relaybus_core::{Agent, AgentHandle, Descriptor, FilterOutcome, OperationMode, ProcessOutcome, Slots};

/// CLI arguments for the `printer` demo agent.
#[derive(Debug, Clone, clap::Args)]
pub struct PrinterArgs {
    /// Regex patterns; selectors matching any of them are printed on
    /// request. An empty list matches every selector.
    #[arg(long = "printer-selector", value_name = "REGEX")]
    pub selectors: Vec<String>,

    /// Print only the raw value, without the selector/label/uuid header.
    #[arg(long = "printer-raw")]
    pub raw: bool,
}

pub struct Printer {
    raw: bool,
    regexes: Vec<Regex>,
}

impl Printer {
    pub fn new(args: PrinterArgs) -> anyhow::Result<Self> {
        let regexes = args.selectors.iter().map(|s| Regex::new(s)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { raw: args.raw, regexes })
    }
}

#[async_trait]
impl Agent for Printer {
    fn name(&self) -> &str {
        "printer"
    }

    fn operation_modes(&self) -> &[OperationMode] {
        &[OperationMode::Interactive]
    }

    fn config(&self) -> serde_json::Value {
        json!({ "selectors": self.regexes.iter().map(|r| r.as_str()).collect::<Vec<_>>(), "raw": self.raw })
    }

    fn selector_filter(&self, selector: &str) -> FilterOutcome {
        if self.regexes.is_empty() || self.regexes.iter().any(|r| r.is_match(selector)) {
            FilterOutcome::Accept
        } else {
            FilterOutcome::Reject
        }
    }

    async fn process(&self, descriptor: &Descriptor, _from_id: &str, _slots: &Slots, _handle: &AgentHandle) -> ProcessOutcome {
        if self.raw {
            println!("{}", descriptor.value_text());
        } else {
            println!("---------------------------");
            println!("selector = {}", descriptor.selector);
            println!("label = {}", descriptor.label);
            println!("uuid = {}", descriptor.uuid);
            println!("{}", descriptor.value_text());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "printer_tests.rs"]
mod tests;
