//! Process exit codes.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run finished in `Done`, or verification passed |
//! | 1 | `FAILURE` | Run aborted, verification failed, or any uncaught failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |

/// Type-safe process exit code.
///
/// # Example
///
/// ```rust
/// use initrepo_utils::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::FAILURE, ExitCode::from_i32(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - the run reached `Done`
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Failure - the run aborted or hit an unrecoverable error
    pub const FAILURE: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
