//! Configuration errors and the user-facing error contract.
//!
//! Every error type that can reach the CLI implements [`UserFriendlyError`] so
//! the top-level reporter can print a message, optional context and a list of
//! suggested actions without matching on concrete types.

use std::fmt;
use thiserror::Error;

/// Trait for errors that can explain themselves to an operator.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for grouping in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Backend,
    Protocol,
    PhaseExecution,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Backend => write!(f, "Backend Process"),
            Self::Protocol => write!(f, "Protocol"),
            Self::PhaseExecution => write!(f, "Phase Execution"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file {path}: {reason}")]
    InvalidFile { path: String, reason: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Backend server not found (searched: {searched})")]
    ServerNotFound { searched: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile { path, reason } => {
                format!("Configuration file {path} has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::ServerNotFound { .. } => "Could not locate the InitRepo MCP server".to_string(),
            Self::ValidationFailed { errors, .. } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile { .. } => Some(
                "Configuration files must be valid TOML with optional [backend], [execution] and [gates] tables."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has range requirements."
            )),
            Self::NotFound { .. } => Some(
                "An explicit --config path must point at an existing file.".to_string(),
            ),
            Self::ServerNotFound { searched } => Some(format!("Searched: {searched}")),
            Self::ValidationFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile { .. } | Self::ValidationFailed { .. } => vec![
                "Check the file against the documented keys".to_string(),
                "Remove unknown or misspelled keys".to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![format!("Adjust '{key}' in .initrepo/config.toml")],
            Self::NotFound { path } => vec![format!("Create {path} or drop the --config flag")],
            Self::ServerNotFound { .. } => vec![
                "Install the server with: npm install initrepo-mcp".to_string(),
                "Or set backend.server_path in .initrepo/config.toml".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}
