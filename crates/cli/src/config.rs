// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// In-process coordination bus for content-addressed descriptor pipelines.
#[derive(Debug, Parser)]
#[command(name = "relaybus", version, about)]
pub struct Config {
    /// Domain the seeded descriptors and demo agents operate in.
    #[arg(long, env = "RELAYBUS_DOMAIN", default_value = "bin")]
    pub domain: String,

    /// Log format (json or text).
    #[arg(long, env = "RELAYBUS_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "RELAYBUS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seed values, each pushed as a `/raw/%<hash>` descriptor before the
    /// demo agents run.
    #[arg(long = "seed", value_name = "VALUE")]
    pub seed_values: Vec<String>,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid --log-format: {other} (expected json or text)"),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
