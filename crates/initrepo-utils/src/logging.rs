//! Tracing setup and structured phase logging.

use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise verbose mode logs the initrepo crates
/// at debug level with targets and span-close timings; the default is a
/// compact info-level format. Logs go to stderr so stdout stays free for
/// reports.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("initrepo=debug,info")
            } else {
                EnvFilter::try_new("initrepo=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Create a span for one phase of a run.
pub fn phase_span(run_id: &str, phase: &str) -> tracing::Span {
    span!(Level::INFO, "phase", run_id = %run_id, phase = %phase)
}

/// Log phase start with structured fields
pub fn log_phase_start(run_id: &str, phase: &str) {
    info!(run_id = %run_id, phase = %phase, "Starting phase");
}

/// Log phase completion with its score and duration
pub fn log_phase_complete(run_id: &str, phase: &str, score: u8, duration_ms: u128) {
    info!(
        run_id = %run_id,
        phase = %phase,
        score = score,
        duration_ms = %duration_ms,
        "Phase completed"
    );
}

/// Log a failed phase with its reason
pub fn log_phase_error(run_id: &str, phase: &str, reason: &str, duration_ms: u128) {
    error!(
        run_id = %run_id,
        phase = %phase,
        duration_ms = %duration_ms,
        error = %reason,
        "Phase failed"
    );
}
