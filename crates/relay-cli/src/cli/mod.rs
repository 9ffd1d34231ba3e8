//! CLI command definitions and dispatch for the `relay` binary.
//!
//! Uses clap derive macros for argument parsing, verb-first and flattened:
//! this binary only ever talks about workflows, so the verbs sit at the
//! top level instead of behind a `workflow` subcommand.

pub mod schedule;
pub mod workflow;

use clap::{Parser, Subcommand};

/// Run and manage scheduled/manual workflow pipelines.
#[derive(Parser)]
#[command(name = "relay", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Workspace root (defaults to the current directory).
    #[arg(long, global = true)]
    pub base_dir: Option<std::path::PathBuf>,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register (or re-register) a workflow from a YAML file.
    Create {
        /// Path to the workflow YAML file.
        file: std::path::PathBuf,
    },

    /// Trigger a workflow run manually.
    Trigger {
        /// Workflow name.
        name: String,

        /// Override a parameter of the first step, `key=value`. Repeatable.
        /// Mirrors the documented manual-run convenience of substituting
        /// e.g. `prompt` for an AI-generation first step.
        #[arg(long = "override", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },

    /// List registered workflows.
    #[command(alias = "ls")]
    List,

    /// Show recent runs for a workflow.
    Status {
        /// Workflow name.
        name: String,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Number of runs to skip (for pagination).
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Show step-by-step logs for a specific run.
    Logs {
        /// Workflow name.
        name: String,

        /// Run ID (defaults to the most recent run).
        run_id: Option<String>,
    },

    /// Cancel the in-flight run for a workflow.
    Cancel {
        /// Workflow name.
        name: String,
    },

    /// List definition backups for a workflow.
    Backups {
        /// Workflow name.
        name: String,
    },

    /// Scheduler operations.
    Schedule {
        #[command(subcommand)]
        action: schedule::ScheduleCommand,
    },

    /// Start the scheduler and block, dispatching scheduled workflows as
    /// their cron triggers fire, until interrupted.
    Serve,
}
