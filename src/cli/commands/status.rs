//! `initrepo status`

use std::path::Path;

use anyhow::Result;
use tracing::warn;

use super::output::emit_json;
use crate::{Config, EngineError, ExitCode, ProjectStatus, RpcBackend, project_status};

pub async fn run_status(config: &Config, project_root: &Path, json: bool) -> Result<ExitCode> {
    let backend = RpcBackend::launch(config, project_root).await?;
    let result = project_status(&backend).await;
    if let Err(e) = backend.stop().await {
        warn!(error = %e, "Failed to stop the MCP backend cleanly");
    }
    let status = result.map_err(EngineError::from)?;

    if json {
        println!("{}", emit_json(&status)?);
    } else {
        println!("{}", render_status(&status, project_root));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_status(status: &ProjectStatus, project_root: &Path) -> String {
    let mut lines = Vec::new();
    let path = status
        .path
        .clone()
        .unwrap_or_else(|| project_root.display().to_string());
    lines.push(format!(
        "Project {} ({path})",
        status.name.as_deref().unwrap_or("(unnamed)")
    ));
    if let Some(updated) = &status.last_updated {
        lines.push(format!("  Last updated:        {updated}"));
    }
    lines.push(format!(
        "  Health score:        {}% ({})",
        status.health_score,
        status.health_band.as_str()
    ));
    lines.push(format!(
        "  Documentation:       {}",
        if status.doc_complete { "complete" } else { "incomplete" }
    ));
    lines.push(format!(
        "  Ready to implement:  {}",
        if status.ready_for_implementation { "yes" } else { "no" }
    ));
    lines.push(format!("  Critical tasks:      {}", status.critical_tasks.len()));
    for (state, tasks) in status.tasks_by_status() {
        lines.push(format!("    {state} ({}):", tasks.len()));
        for task in tasks {
            match &task.title {
                Some(title) => lines.push(format!("      {} {title}", task.id)),
                None => lines.push(format!("      {}", task.id)),
            }
        }
    }
    lines.push(format!("  Documentation gaps:  {}", status.documentation_gaps.len()));
    for gap in &status.documentation_gaps {
        lines.push(format!("    - {gap}"));
    }
    lines.push(format!("→ {}", status.next_action.describe()));
    lines.push(format!("✓ {}", status.summary()));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use initrepo_engine::{HealthBand, NextAction, TaskSummary};

    #[test]
    fn test_render_groups_tasks_and_lists_gaps() {
        let status = ProjectStatus {
            name: None,
            path: None,
            last_updated: Some("2026-10-01".into()),
            health_score: 62.0,
            health_band: HealthBand::Fair,
            doc_complete: false,
            ready_for_implementation: true,
            critical_tasks: vec![
                TaskSummary {
                    id: "T-1".into(),
                    title: Some("Login".into()),
                    status: "pending".into(),
                },
                TaskSummary {
                    id: "T-2".into(),
                    title: None,
                    status: "blocked".into(),
                },
            ],
            documentation_gaps: vec!["API reference".into()],
            next_action: NextAction::ContinueBuilding,
        };

        let text = render_status(&status, Path::new("/srv/shop"));
        assert!(text.starts_with("Project (unnamed) (/srv/shop)\n"));
        assert!(text.contains("  Health score:        62% (fair)"));
        assert!(text.contains("    blocked (1):\n      T-2\n    pending (1):\n      T-1 Login"));
        assert!(text.contains("    - API reference"));
        assert!(text.contains("→ Run `initrepo agent`"));
        assert!(text.ends_with("✓ Health 62% (fair), 2 critical task(s), 1 documentation gap(s)"));
    }
}
