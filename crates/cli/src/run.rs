// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires the bundled demo agents onto a fresh [`Bus`], seeds any
//! `--seed` values as descriptors, drives the pipeline to quiescence, and
//! reports per-agent stats — the shape of `coop::run::run`, minus the PTY
//! and transport machinery this workspace no longer carries.

use anyhow::Result;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use relaybus_core::{Bus, Descriptor};

use crate::agents::linker::{Linker, LinkerArgs};
use crate::agents::lister::{Lister, ListerArgs};
use crate::agents::printer::{Printer, PrinterArgs};
use crate::config::Config;
use crate::logging;
use crate::util::short_hash;

/// CLI arguments for every demo agent this binary bundles, collected so
/// `main` can build them once and hand them to [`run`].
pub struct Agents {
    pub lister: ListerArgs,
    pub printer: PrinterArgs,
    pub linker: LinkerArgs,
}

pub async fn run(config: Config, agents: Agents) -> Result<()> {
    logging::init_tracing(&config);

    let bus = Bus::new();
    Bus::join(&bus, Lister::new(agents.lister), config.domain.clone()).await;
    Bus::join(&bus, Printer::new(agents.printer)?, config.domain.clone()).await;
    let linker_id = Bus::join(&bus, Linker::new(agents.linker)?, config.domain.clone()).await;

    let mut seeded = Vec::with_capacity(config.seed_values.len());
    for value in &config.seed_values {
        let selector = format!("/raw/%{}", short_hash(value));
        let descriptor = Descriptor::new(config.domain.clone(), selector.clone(), Uuid::new_v4(), value.clone(), json!(value));
        if bus.push(&linker_id, descriptor).await {
            seeded.push(selector);
        }
    }

    // `printer` joins in interactive mode (spec.md §4.E step 4): nothing it
    // saw above ran `process` yet, just `mark_processable`. Explicitly ask
    // for it now so a seeded run actually prints something.
    for selector in &seeded {
        bus.request_processing(&linker_id, &config.domain, selector, &["printer".to_owned()]).await;
    }

    bus.run_agents().await;
    bus.persist_all();

    for (agent, (processed, processable)) in bus.processed_stats(&config.domain) {
        info!(agent = %agent, processed, processable, "agent stats");
    }

    Ok(())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
