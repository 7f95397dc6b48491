// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `linker`: demonstrates `AgentHandle::declare_link` by pushing two
//! derived descriptors — a summary and a tag — for every selector it
//! accepts, each crediting `linker` and naming the input as its precursor.
//! There is no equivalent agent in `examples/original_source`; this one
//! exists purely to exercise `declare_link` end to end (SPEC_FULL.md,
//! "Supplemented from original source").

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use relaybus_core::{Agent, AgentHandle, Descriptor, FilterOutcome, OperationMode, ProcessOutcome, Slots};

use crate::util::short_hash;

/// CLI arguments for the `linker` demo agent.
#[derive(Debug, Clone, clap::Args)]
pub struct LinkerArgs {
    /// Only derive links for selectors matching this regex.
    #[arg(long = "link-selector", value_name = "REGEX", default_value = "^/raw/")]
    pub selector_regex: String,

    /// Label recorded on the derived tag descriptor.
    #[arg(long = "link-tag", default_value = "linked")]
    pub tag: String,
}

pub struct Linker {
    regex: Regex,
    tag: String,
}

impl Linker {
    pub fn new(args: LinkerArgs) -> anyhow::Result<Self> {
        let regex = Regex::new(&args.selector_regex)?;
        Ok(Self { regex, tag: args.tag })
    }
}

#[async_trait]
impl Agent for Linker {
    fn name(&self) -> &str {
        "linker"
    }

    fn operation_modes(&self) -> &[OperationMode] {
        &[OperationMode::Automatic]
    }

    fn config(&self) -> serde_json::Value {
        json!({ "selector_regex": self.regex.as_str(), "tag": self.tag })
    }

    fn selector_filter(&self, selector: &str) -> FilterOutcome {
        if self.regex.is_match(selector) {
            FilterOutcome::Accept
        } else {
            FilterOutcome::Reject
        }
    }

    async fn process(&self, descriptor: &Descriptor, _from_id: &str, _slots: &Slots, handle: &AgentHandle) -> ProcessOutcome {
        let digest = short_hash(&descriptor.selector);
        let summary_selector = format!("/summary/%{digest}");
        let tag_selector = format!("/tag/{}/%{digest}", self.tag);

        handle
            .declare_link(
                descriptor.uuid,
                format!("summary of {}", descriptor.label),
                summary_selector,
                vec![descriptor.selector.clone()],
                json!({ "length": descriptor.value_text().len() }),
            )
            .await;

        handle
            .declare_link(
                descriptor.uuid,
                format!("{} tag", self.tag),
                tag_selector,
                vec![descriptor.selector.clone()],
                json!(self.tag),
            )
            .await;

        Ok(())
    }
}

#[cfg(test)]
#[path = "linker_tests.rs"]
mod tests;
