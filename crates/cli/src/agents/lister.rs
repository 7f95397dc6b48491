// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ls`: lists selectors matching a regex to stdout. Grounded on
//! `examples/original_source/rebus/agents/ls.py` — a one-shot, `run`-driven
//! agent rather than a per-descriptor processor; it takes no action on
//! individual descriptors and carries no persistent state.

use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::warn;

use relaybus_core::{Agent, AgentHandle, OperationMode, RunOutcome};

/// CLI arguments for the `ls` demo agent, flattened into the binary's
/// top-level `Cli` (mirrors `coop::attach::AttachArgs` being a
/// `clap::Args` struct flattened into a subcommand).
#[derive(Debug, Clone, clap::Args)]
pub struct ListerArgs {
    /// Maximum number of selectors to return per pattern (0 = unlimited).
    #[arg(long = "ls-limit", default_value_t = 0)]
    pub limit: usize,

    /// Regex patterns to match selectors against; matches are printed to
    /// stdout. An empty list matches every selector in the domain.
    #[arg(long = "ls-selector", value_name = "REGEX")]
    pub selectors: Vec<String>,
}

pub struct Lister {
    args: ListerArgs,
}

impl Lister {
    pub fn new(args: ListerArgs) -> Self {
        Self { args }
    }

    fn patterns(&self) -> Vec<String> {
        if self.args.selectors.is_empty() {
            vec![String::new()]
        } else {
            self.args.selectors.clone()
        }
    }
}

#[async_trait]
impl Agent for Lister {
    fn name(&self) -> &str {
        "ls"
    }

    fn operation_modes(&self) -> &[OperationMode] {
        &[OperationMode::Automatic]
    }

    fn config(&self) -> serde_json::Value {
        json!({ "limit": self.args.limit, "selectors": self.args.selectors })
    }

    fn needs_worker(&self) -> bool {
        true
    }

    async fn run(&self, handle: &AgentHandle) -> RunOutcome {
        let domain = handle.domain().to_owned();
        let limit = if self.args.limit == 0 { None } else { Some(self.args.limit) };
        let mut seen = HashSet::new();

        for pattern in self.patterns() {
            let regex = Regex::new(&pattern)?;
            let matches = handle.find(&domain, &regex, limit, 0);
            if matches.is_empty() {
                warn!(domain = %domain, pattern = %pattern, "ls: no selectors matched");
                continue;
            }
            for selector in matches {
                if seen.insert(selector.clone()) {
                    println!("{selector}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "lister_tests.rs"]
mod tests;
