// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use relaybus_cli::agents::linker::LinkerArgs;
use relaybus_cli::agents::lister::ListerArgs;
use relaybus_cli::agents::printer::PrinterArgs;
use relaybus_cli::config::Config;
use relaybus_cli::run::{self, Agents};

#[derive(Parser)]
#[command(name = "relaybus", version, about = "Run the in-process descriptor bus with the bundled demo agents.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(flatten)]
    lister: ListerArgs,

    #[command(flatten)]
    printer: PrinterArgs,

    #[command(flatten)]
    linker: LinkerArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    let agents = Agents { lister: cli.lister, printer: cli.printer, linker: cli.linker };

    if let Err(e) = run::run(cli.config, agents).await {
        tracing::error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
