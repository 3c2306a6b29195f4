//! Output rendering shared by the commands.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{PhaseResult, RunReport};

/// Pretty JSON for `--json` output.
pub fn emit_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to emit JSON output")
}

pub fn phase_line(result: &PhaseResult) -> String {
    let mark = if result.success { '✓' } else { '✗' };
    let mut line = format!(
        "{mark} {:<18} score {:>3}  ({} ms)",
        result.phase.to_string(),
        result.score,
        result.duration_ms
    );
    if let Some(reason) = result.reason.as_deref().filter(|_| !result.success) {
        line.push_str("\n    ");
        line.push_str(reason);
    }
    line
}

/// Per-phase lines followed by the run summary.
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    for phase in &report.phases {
        out.push_str(&phase_line(phase));
        out.push('\n');
    }
    out.push_str(&report.summary());
    out
}
