//! # amilayer CLI Module
//!
//! This module implements the CLI interface for amilayer.
//!
//! ## Available Commands
//!
//! - `external` - Answer an external data source query on stdin
//! - `plan` - Show which images this run would rebuild
//! - `render` - Write the build specification of every affected group

mod commands;

use crate::config::Settings;
use amilayer_core::AmiLayerError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// amilayer - rebuild layered machine images one hop at a time
///
/// Compares declared images against the last successful builds and emits
/// build templates for the images that must be rebuilt in this run.
#[derive(Parser, Debug)]
#[command(name = "amilayer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to an amilayer.toml settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Deployment context: omit the AWS profile from builders
    #[arg(
        long,
        global = true,
        env = "IS_DEPLOYMENT",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub deployment: bool,

    /// Fail on duplicate image names instead of keeping the last declaration
    #[arg(long, global = true)]
    pub strict_duplicates: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a query object from stdin and write group templates to stdout
    External,

    /// Show the images selected for this run and their versions
    Plan {
        /// Image definitions (JSON array or TOML with [[groups]])
        #[arg(short, long)]
        definitions: PathBuf,

        /// Last built state (JSON object keyed by image name)
        #[arg(short, long)]
        state: Option<PathBuf>,
    },

    /// Write <group>.json build templates for this run
    Render {
        /// Image definitions (JSON array or TOML with [[groups]])
        #[arg(short, long)]
        definitions: PathBuf,

        /// Last built state (JSON object keyed by image name)
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Directory to write templates into
        #[arg(short, long)]
        output: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), AmiLayerError> {
    let settings = Settings::load(cli.config.as_deref())?
        .with_overrides(cli.deployment, cli.strict_duplicates);
    tracing::debug!(?settings, "Resolved settings");

    match cli.command {
        Commands::External => cmd_external(&settings),
        Commands::Plan { definitions, state } => {
            cmd_plan(&settings, cli.json_mode, &definitions, state.as_deref())
        }
        Commands::Render {
            definitions,
            state,
            output,
        } => cmd_render(&settings, &definitions, state.as_deref(), &output),
    }
}
