//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Resolves the project root and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output

use std::path::{Path, PathBuf};

use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

use crate::{Config, ConfigError, EngineError, ExitCode, UserFriendlyError};

/// Main CLI execution function.
///
/// Handles ALL output including errors and returns `Err(ExitCode)` for any
/// non-zero outcome. main.rs only maps that to the process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = initrepo_utils::logging::init_tracing(cli.verbose) {
        eprintln!("⚠ Failed to initialize logging: {e}");
    }

    let project_root = match resolve_project_root(cli.project_root.as_deref()) {
        Ok(root) => root,
        Err(err) => {
            report_error(&err);
            return Err(ExitCode::CLI_ARGS);
        }
    };

    let config = match Config::discover_from(&project_root, &cli.to_cli_args()) {
        Ok(config) => config,
        Err(err) => {
            report_error(&err);
            return Err(ExitCode::CLI_ARGS);
        }
    };

    if let Commands::Config { json } = cli.command {
        return finish(commands::config::show(&config, json));
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::FAILURE);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Agent { json } => commands::agent::run_agent(&config, &project_root, json).await,
            Commands::Status { json } => commands::status::run_status(&config, &project_root, json).await,
            Commands::Implement { feature, json } => {
                commands::implement::run_implement(&config, &project_root, &feature.join(" "), json).await
            }
            Commands::Verify { task_id, json } => {
                commands::verify::run_verify(&config, &project_root, task_id.as_deref(), json).await
            }
            Commands::Config { .. } => Ok(ExitCode::SUCCESS),
        }
    });

    finish(result)
}

fn finish(result: anyhow::Result<ExitCode>) -> Result<(), ExitCode> {
    match result {
        Ok(code) if code.is_success() => Ok(()),
        Ok(code) => Err(code),
        Err(err) => match err.downcast_ref::<EngineError>() {
            Some(engine) => {
                report_error(engine);
                Err(engine.to_exit_code())
            }
            None => {
                eprintln!("✗ {err:#}");
                Err(ExitCode::FAILURE)
            }
        },
    }
}

/// Explicit root must be an existing directory; default is the working directory.
fn resolve_project_root(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) if path.is_dir() => Ok(path.to_path_buf()),
        Some(path) => Err(ConfigError::InvalidValue {
            key: "project_root".to_string(),
            value: format!("{} is not a directory", path.display()),
        }),
        None => std::env::current_dir().map_err(|e| ConfigError::InvalidValue {
            key: "project_root".to_string(),
            value: format!("cannot read the current directory: {e}"),
        }),
    }
}

fn report_error(err: &dyn UserFriendlyError) {
    eprintln!("{}", render_error(err));
}

/// Render an error with its context and suggestions for stderr.
pub(crate) fn render_error(err: &dyn UserFriendlyError) -> String {
    let mut out = format!("✗ {} error: {}", err.category(), err.user_message());
    if let Some(context) = err.context() {
        for line in context.lines() {
            out.push_str("\n  ");
            out.push_str(line);
        }
    }
    let suggestions = err.suggestions();
    if !suggestions.is_empty() {
        out.push_str("\n\nSuggestions:");
        for suggestion in suggestions {
            out.push_str("\n  • ");
            out.push_str(&suggestion);
        }
    }
    out
}
