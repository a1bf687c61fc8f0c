// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod period;
pub mod schedule;
pub mod sinks;
pub mod utils;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs the global subscriber once. `RUST_LOG` wins; otherwise the crate logs at info
/// to stderr so table and JSON output on stdout stay clean.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ledgerwise=info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
