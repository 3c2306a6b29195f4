//! `initrepo implement <FEATURE>`

use std::path::Path;

use anyhow::Result;
use initrepo_engine::plan::DOCUMENTATION_FILES;
use serde_json::{Value, json};
use tracing::warn;

use super::output::emit_json;
use crate::{Config, EngineError, ExitCode, ImplementationPlan, RpcBackend, find_related_ids, plan_implementation};

/// Find related items in the docs, then ask the backend for a plan.
///
/// Nothing related means exit 1 without launching the backend.
pub async fn run_implement(config: &Config, project_root: &Path, feature: &str, json: bool) -> Result<ExitCode> {
    let matches = find_related_ids(project_root, feature);
    if matches.is_empty() {
        if json {
            let missing = json!({"feature": feature, "found": false, "searched": DOCUMENTATION_FILES});
            println!("{}", emit_json(&missing)?);
        } else {
            println!("✗ No documentation found for \"{feature}\"");
            println!("\nSuggestions:");
            println!("  • Check that the project has InitRepo documentation under docs/");
            println!("  • Use a task id such as T-001, or a word that appears next to one");
        }
        return Ok(ExitCode::FAILURE);
    }

    let backend = RpcBackend::launch(config, project_root).await?;
    let result = plan_implementation(&backend, feature, matches).await;
    if let Err(e) = backend.stop().await {
        warn!(error = %e, "Failed to stop the MCP backend cleanly");
    }
    let plan = result.map_err(EngineError::from)?;

    if json {
        println!("{}", emit_json(&plan)?);
    } else {
        println!("{}", render_plan(&plan));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_plan(plan: &ImplementationPlan) -> String {
    let mut lines = vec![format!("Related items: {}", plan.matches.join(", "))];
    for item in &plan.contexts {
        lines.push(format!("  {:<7} {}", item.id, headline(&item.context)));
        if let Some(brief) = &item.brief {
            lines.push(format!("          Approach: {}", headline(brief)));
        }
    }
    if !plan.recommended_order.is_empty() {
        lines.push("Recommended order:".to_string());
        for (position, id) in plan.recommended_order.iter().enumerate() {
            lines.push(format!("  {}. {id}", position + 1));
        }
    }
    if !plan.prerequisites.is_empty() {
        lines.push("Prerequisites:".to_string());
        for prerequisite in &plan.prerequisites {
            lines.push(format!("  - {prerequisite}"));
        }
    }
    lines.push(format!("Estimated effort: {}", plan.estimated_effort));
    lines.push(format!("✓ {}", plan.summary()));
    lines.join("\n")
}

/// First line of the most descriptive field of a context or brief.
fn headline(value: &Value) -> String {
    let text = match value {
        Value::String(s) => Some(s.as_str()),
        _ => ["technicalApproach", "content", "title", "description", "brief"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str)),
    };
    text.and_then(|t| t.lines().next())
        .unwrap_or("No description")
        .to_string()
}
