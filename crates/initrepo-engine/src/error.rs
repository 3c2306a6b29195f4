//! Engine error type and its mapping to exit codes.

use initrepo_transport::{RpcError, TransportError};
use initrepo_utils::{ConfigError, ErrorCategory, ExitCode, PhaseId, UserFriendlyError};
use thiserror::Error;

/// Failures that end a run or a verification without a report.
///
/// Guard failures are not errors: they produce an aborted
/// [`RunReport`](crate::RunReport).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Transport(#[from] TransportError),

    #[error("Backend connection lost during {phase}: {source}")]
    TransportLost {
        phase: PhaseId,
        #[source]
        source: RpcError,
    },

    #[error("Tool call failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("This orchestrator has already run")]
    AlreadyRun,
}

impl EngineError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            _ => ExitCode::FAILURE,
        }
    }
}

impl UserFriendlyError for EngineError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Transport(TransportError::StartupTimeout { timeout, .. }) => {
                format!("The MCP server did not report readiness within {timeout:?}")
            }
            Self::Transport(TransportError::ExitedBeforeReady { .. }) => {
                "The MCP server exited during startup".to_string()
            }
            Self::Transport(e) => format!("Could not run the MCP server: {e}"),
            Self::TransportLost { phase, .. } => {
                format!("Lost the MCP server connection during the {phase} phase")
            }
            Self::Rpc(e) => e.to_string(),
            Self::AlreadyRun => self.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Transport(e) => e
                .stderr_tail()
                .map(|tail| format!("Server stderr:\n{tail}")),
            Self::TransportLost { source, .. } => Some(source.to_string()),
            Self::Rpc(_) | Self::AlreadyRun => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Transport(TransportError::Spawn { .. }) => vec![
                "Check that Node.js is installed and on PATH".to_string(),
                "Set backend.command in .initrepo/config.toml".to_string(),
            ],
            Self::Transport(_) => vec![
                "Run the server by hand to see its startup output".to_string(),
                "Raise backend.startup_timeout_secs for slow machines".to_string(),
            ],
            Self::TransportLost { .. } => {
                vec!["Re-run with --verbose to capture server output".to_string()]
            }
            Self::Rpc(RpcError::Timeout { .. }) => {
                vec!["Raise backend.call_timeout_secs or --call-timeout".to_string()]
            }
            Self::Rpc(_) | Self::AlreadyRun => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Transport(_) => ErrorCategory::Backend,
            Self::TransportLost { .. } | Self::Rpc(_) => ErrorCategory::Protocol,
            Self::AlreadyRun => ErrorCategory::PhaseExecution,
        }
    }
}
