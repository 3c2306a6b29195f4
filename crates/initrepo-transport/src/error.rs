//! Error types for the transport and RPC layers

use std::time::Duration;
use thiserror::Error;

/// Failures of the backend process or its streams.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to spawn backend `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Backend did not signal readiness within {timeout:?}")]
    StartupTimeout {
        timeout: Duration,
        stderr_tail: String,
    },

    #[error("Backend closed its diagnostic stream before signalling readiness")]
    ExitedBeforeReady { stderr_tail: String },

    #[error("Transport is closed")]
    TransportClosed,

    #[error("Write did not complete within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Captured backend stderr, when the error carries any.
    #[must_use]
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            Self::StartupTimeout { stderr_tail, .. } | Self::ExitedBeforeReady { stderr_tail } => {
                Some(stderr_tail.as_str()).filter(|s| !s.is_empty())
            }
            _ => None,
        }
    }
}

/// Outcome of a tool call other than a result value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("Backend reported an error for `{tool}`: {message}")]
    Remote {
        tool: String,
        message: String,
        code: Option<i64>,
    },

    #[error("No response to `{tool}` (id {id}) within {timeout:?}")]
    Timeout {
        tool: String,
        id: u64,
        timeout: Duration,
    },

    #[error("Transport closed")]
    TransportClosed,

    #[error("Failed to encode request for `{tool}`: {reason}")]
    Encode { tool: String, reason: String },
}

impl RpcError {
    /// True when the connection itself is gone and no further call can succeed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportClosed)
    }
}
