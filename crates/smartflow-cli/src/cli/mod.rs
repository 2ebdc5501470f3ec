//! CLI command definitions for the `smartflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod logs;
pub mod run;
pub mod workflows;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use smartflow_types::config::StorageKind;

/// Run AI task workflows with evaluation, retries, and checkpointing.
#[derive(Parser)]
#[command(name = "smartflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Storage backend (overrides STORAGE_TYPE and smartflow.toml).
    #[arg(long, global = true, value_name = "sqlite|json")]
    pub storage: Option<StorageKind>,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workflow on the given input.
    Run(run::RunArgs),

    /// Show per-substep telemetry for a workflow run.
    Logs {
        /// Workflow (run) id.
        workflow_id: String,
    },

    /// Print the stored memory snapshot of a workflow run.
    State {
        /// Workflow (run) id.
        workflow_id: String,
    },

    /// List workflow runs with stored state.
    #[command(alias = "ls")]
    List,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Default tracing filter for the chosen verbosity; RUST_LOG overrides it.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,smartflow_core=debug,smartflow_infra=debug",
            _ => "trace",
        }
    }
}
