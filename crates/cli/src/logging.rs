// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup, copied verbatim in approach from the teacher's
//! `coop::run::init_tracing`: the explicit `--log-level` flag wins unless
//! the caller left it at the default and `RUST_LOG` is set, in which case
//! `RUST_LOG` wins. `try_init` so repeated calls across tests stay inert.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub fn init_tracing(config: &Config) {
    let filter = if std::env::var("RELAYBUS_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}
