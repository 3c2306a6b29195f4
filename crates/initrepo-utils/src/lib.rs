//! Foundation utilities shared by every initrepo crate.
//!
//! - [`error`]: configuration errors and the user-facing error trait
//! - [`exit_codes`]: process exit codes
//! - [`logging`]: tracing setup and structured phase logging
//! - [`types`]: identifiers shared across crates

pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod types;

pub use error::{ConfigError, ErrorCategory, UserFriendlyError};
pub use exit_codes::ExitCode;
pub use types::PhaseId;
