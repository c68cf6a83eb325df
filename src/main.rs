//! trickster: caching reverse proxy for Prometheus-compatible query APIs.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ net::listener ─▶ http::server ─▶ routing::OriginRouter
//!                                                          │
//!                                                          ▼
//!                                    http::handlers (ping, health, query, proxy)
//!                                          │                    │
//!                                          ▼                    ▼
//!                                     cache (memory/fs)   http::upstream ─▶ Origin
//!
//!     lifecycle::Sequencer: logger → profiler → metrics → cache → tracing
//!                           → router → listener
//! ```

use std::process::ExitCode;

use clap::Parser;

use trickster::config::loader::load_configuration;
use trickster::config::Args;
use trickster::lifecycle::Sequencer;

fn main() -> ExitCode {
    let args = Args::parse();

    // The logger depends on the configuration, so load errors go to stderr.
    let config = match load_configuration(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("trickster: could not load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match Sequencer::new(config).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
