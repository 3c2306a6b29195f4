//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::CliArgs;

/// initrepo - autonomous phase-driven build agent for InitRepo MCP backends
#[derive(Parser, Debug)]
#[command(name = "initrepo")]
#[command(about = "Drive an InitRepo MCP backend through discovery, planning, implementation and QA")]
#[command(long_about = r#"
initrepo launches the InitRepo MCP server as a child process and drives it
through four gated phases, stopping at the first phase that fails its guard.

EXAMPLES:
  # Run the full autonomous agent in the current project
  initrepo agent

  # Emit the run report as JSON
  initrepo agent --json

  # Snapshot of health, critical tasks and documentation gaps
  initrepo status

  # Plan the implementation of a feature or task
  initrepo implement user authentication
  initrepo implement T-025

  # Verify the whole project, or a single task
  initrepo verify
  initrepo verify T-042

  # Show the effective configuration and where each value came from
  initrepo config

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from the project root for
  .initrepo/config.toml, then in the user config directory.
  Use --config to specify an explicit config file path

PHASES:
  Discovery → Planning → Implementation → QualityAssurance
  Implementation needs 80% of tasks to complete; QA needs health ≥ 85 and
  quality ≥ 80. Thresholds are configurable under [gates].

EXIT CODES:
  0  run completed / verification passed / status or plan produced
  1  run aborted, verification failed, nothing to plan or backend error
  2  invalid configuration or arguments
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Project root passed to the backend (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Per-call timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub call_timeout: Option<u64>,

    /// Pause after each implemented task in milliseconds (0 disables)
    #[arg(long, global = true, value_name = "MS")]
    pub pacing_ms: Option<u64>,

    /// Number of tasks implemented concurrently
    #[arg(long, global = true, value_name = "N")]
    pub max_parallel: Option<usize>,

    /// Path to the MCP server entry point (skips server discovery)
    #[arg(long, global = true)]
    pub server_path: Option<PathBuf>,

    /// Command used to run the backend (default: node)
    #[arg(long, global = true)]
    pub backend_command: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the autonomous agent through every phase
    ///
    /// EXAMPLES:
    ///   initrepo agent
    ///   initrepo agent --pacing-ms 0 --json
    Agent {
        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show project health, critical tasks and documentation gaps
    Status {
        /// Output the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan the implementation of a feature or task
    ///
    /// Task ids are found on documentation lines that mention the feature,
    /// or FEATURE may be an id such as T-025. The plan lists related
    /// context, the dependency order and the estimated effort.
    ///
    /// EXAMPLES:
    ///   initrepo implement email warming
    ///   initrepo implement T-025 --json
    Implement {
        /// Feature description or task id
        #[arg(required = true, num_args = 1..)]
        feature: Vec<String>,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify the project, or a single task when TASK_ID is given
    ///
    /// Project verification passes when the verification score meets
    /// gates.min_verification_score. Task verification passes when the task's
    /// context validates and no cross-reference issues remain.
    Verify {
        /// Task to verify
        task_id: Option<String>,

        /// Output the verification result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration with the source of each value
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Overrides handed to configuration discovery.
    #[must_use]
    pub fn to_cli_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            backend_command: self.backend_command.clone(),
            server_path: self.server_path.clone(),
            call_timeout_secs: self.call_timeout,
            item_pacing_ms: self.pacing_ms,
            max_parallel: self.max_parallel,
        }
    }
}

/// Build the clap command, for completions and help rendering.
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
