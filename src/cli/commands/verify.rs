//! `initrepo verify [TASK_ID]`

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use super::output::emit_json;
use crate::{
    Config, EngineError, ExitCode, ProjectVerification, RpcBackend, TaskVerification, verify_project,
    verify_task,
};

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Verification {
    Project(ProjectVerification),
    Task(TaskVerification),
}

impl Verification {
    fn passed(&self) -> bool {
        match self {
            Self::Project(p) => p.passed,
            Self::Task(t) => t.passed,
        }
    }

    fn summary(&self) -> String {
        match self {
            Self::Project(p) => p.summary(),
            Self::Task(t) => t.summary(),
        }
    }
}

pub async fn run_verify(
    config: &Config,
    project_root: &Path,
    task_id: Option<&str>,
    json: bool,
) -> Result<ExitCode> {
    let backend = RpcBackend::launch(config, project_root).await?;

    let result = match task_id {
        Some(id) => verify_task(&backend, id).await.map(Verification::Task),
        None => verify_project(&backend, &config.gate_thresholds())
            .await
            .map(Verification::Project),
    };
    if let Err(e) = backend.stop().await {
        warn!(error = %e, "Failed to stop the MCP backend cleanly");
    }
    let verification = result.map_err(EngineError::from)?;

    if json {
        println!("{}", emit_json(&verification)?);
    } else {
        if let Verification::Project(p) = &verification {
            println!("  Health score:        {}", p.inputs.health_score);
            println!("  Documentation:       {}", if p.inputs.doc_complete { "complete" } else { "incomplete" });
            println!("  Cross-ref issues:    {}", p.inputs.issue_count);
            println!("  Documentation gaps:  {}", p.inputs.gap_count);
            println!("  Orphaned references: {}", p.inputs.orphan_count);
            println!("  Remaining tasks:     {}", p.remaining_tasks);
        }
        let mark = if verification.passed() { '✓' } else { '✗' };
        println!("{mark} {}", verification.summary());
    }

    Ok(if verification.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
