//! # amilayer
//!
//! The main binary for the amilayer image rebuild planner.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/amilayer (THE BINARY)               │
//! │                                                          │
//! │  ┌──────────────┐   ┌──────────────┐   ┌─────────────┐   │
//! │  │     CLI      │   │   Envelope   │   │  Settings   │   │
//! │  │    (clap)    │   │ (stdin/out)  │   │   (toml)    │   │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬──────┘   │
//! │         └──────────────────┼──────────────────┘          │
//! │                            ▼                             │
//! │                   ┌────────────────┐                     │
//! │                   │ amilayer-core  │                     │
//! │                   │  (THE LOGIC)   │                     │
//! │                   └────────────────┘                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # As an external data source
//! echo '{"current_images":"{}","image_definitions":"[]"}' | amilayer external
//!
//! # Inspect or render a run
//! amilayer plan -d images.json -s state.json
//! amilayer render -d images.toml -s state.json -o build/
//! ```

use amilayer::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // Logs go to stderr; stdout carries command output only.
    // AMILAYER_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("AMILAYER_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "amilayer=debug"
    } else {
        "amilayer=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
