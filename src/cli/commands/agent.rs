//! `initrepo agent`

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use super::output::{emit_json, render_report};
use crate::{Config, ExitCode, OrchestratorSettings, PhaseOrchestrator, RpcBackend};

/// Launch the backend, run every phase and print the report.
///
/// The backend is stopped before returning, whatever the outcome.
pub async fn run_agent(config: &Config, project_root: &Path, json: bool) -> Result<ExitCode> {
    let backend = Arc::new(RpcBackend::launch(config, project_root).await?);
    let mut orchestrator = PhaseOrchestrator::new(backend.clone(), OrchestratorSettings::from(config));

    let result = orchestrator.run().await;
    if let Err(e) = backend.stop().await {
        warn!(error = %e, "Failed to stop the MCP backend cleanly");
    }
    let report = result?;

    if json {
        println!("{}", emit_json(&report)?);
    } else {
        println!("{}", render_report(&report));
    }
    Ok(report.exit_code())
}
