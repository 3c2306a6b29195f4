//! Project and single-task verification.

use initrepo_scoring::{GateResult, GateThresholds, ScoreInputs, verification_score};
use initrepo_transport::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::backend::ToolBackend;
use crate::tools;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectVerification {
    pub inputs: ScoreInputs,
    /// Critical tasks the backend still reports as open
    pub remaining_tasks: u32,
    pub score: u8,
    pub gate: GateResult,
    pub passed: bool,
}

impl ProjectVerification {
    #[must_use]
    pub fn summary(&self) -> String {
        if self.passed {
            format!("Project verification passed with score {}", self.score)
        } else {
            format!("Project verification failed: {}", self.gate.reason())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskVerification {
    pub task_id: String,
    pub found: bool,
    pub context_valid: bool,
    pub cross_ref_issues: u32,
    pub passed: bool,
}

impl TaskVerification {
    #[must_use]
    pub fn summary(&self) -> String {
        match (self.found, self.passed) {
            (false, _) => format!("Task {} not found in documentation", self.task_id),
            (true, true) => format!("Task {} verified", self.task_id),
            (true, false) if !self.context_valid => {
                format!("Task {} failed context validation", self.task_id)
            }
            (true, false) => format!(
                "Task {} has {} cross-reference issue(s)",
                self.task_id, self.cross_ref_issues
            ),
        }
    }
}

/// Score the whole project and apply the verification gate.
///
/// # Errors
///
/// Returns the first failing tool call.
pub async fn verify_project(
    backend: &dyn ToolBackend,
    thresholds: &GateThresholds,
) -> Result<ProjectVerification, RpcError> {
    let health = backend
        .call_tool(tools::GENERATE_PROJECT_HEALTH_REPORT, Map::new())
        .await?;
    let docs = backend
        .call_tool(tools::VALIDATE_DOCUMENTATION_COMPLETENESS, Map::new())
        .await?;
    let cross_refs = backend
        .call_tool(tools::VALIDATE_CROSS_REFERENCES, Map::new())
        .await?;
    let gaps = backend
        .call_tool(tools::CHECK_DOCUMENTATION_GAPS, Map::new())
        .await?;
    let orphans = backend
        .call_tool(tools::FIND_ORPHANED_REFERENCES, Map::new())
        .await?;
    let remaining = backend
        .call_tool(tools::IDENTIFY_NEXT_CRITICAL_TASKS, Map::new())
        .await?;

    let inputs = ScoreInputs {
        health_score: tools::health_score(&health),
        doc_complete: tools::flag(&docs, "isComplete"),
        issue_count: tools::count(&cross_refs, "issues"),
        gap_count: tools::count(&gaps, "gaps"),
        orphan_count: tools::count(&orphans, "orphanedReferences"),
    };
    let score = verification_score(&inputs);
    let gate = thresholds.verification(score);
    info!(score, passed = gate.passed, "Project verification scored");

    Ok(ProjectVerification {
        inputs,
        remaining_tasks: tools::count(&remaining, "tasks"),
        score,
        passed: gate.passed,
        gate,
    })
}

/// Check one task's context and the project's cross-references.
///
/// A null context means the task is unknown; nothing else is called.
///
/// # Errors
///
/// Returns the first failing tool call.
pub async fn verify_task(backend: &dyn ToolBackend, task_id: &str) -> Result<TaskVerification, RpcError> {
    let mut arguments = Map::new();
    arguments.insert("id".to_string(), Value::String(task_id.to_string()));
    let context = backend
        .call_tool(tools::GET_CONTEXT_BY_ID, arguments.clone())
        .await?;

    if context.is_null() {
        return Ok(TaskVerification {
            task_id: task_id.to_string(),
            found: false,
            context_valid: false,
            cross_ref_issues: 0,
            passed: false,
        });
    }

    arguments.insert("context".to_string(), context);
    let validation = backend
        .call_tool(tools::VALIDATE_CONTEXT_UNDERSTANDING, arguments)
        .await?;
    let cross_refs = backend
        .call_tool(tools::VALIDATE_CROSS_REFERENCES, Map::new())
        .await?;

    let context_valid = tools::flag(&validation, "isValid");
    let cross_ref_issues = tools::count(&cross_refs, "issues");
    Ok(TaskVerification {
        task_id: task_id.to_string(),
        found: true,
        context_valid,
        cross_ref_issues,
        passed: context_valid && cross_ref_issues == 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_healthy_project_scores_96() {
        let backend = ScriptedBackend::healthy_project();
        let result = verify_project(&backend, &GateThresholds::default()).await.unwrap();

        assert_eq!(result.score, 96);
        assert!(result.passed);
        assert_eq!(result.remaining_tasks, 3);
        assert_eq!(
            backend.tools_called(),
            [
                "generateProjectHealthReport",
                "validateDocumentationCompleteness",
                "validateCrossReferences",
                "checkDocumentationGaps",
                "findOrphanedReferences",
                "identifyNextCriticalTasks",
            ]
        );
    }

    #[tokio::test]
    async fn test_incomplete_docs_fail_verification() {
        let backend = ScriptedBackend::healthy_project()
            .returning("validateDocumentationCompleteness", json!({"isComplete": false}));
        let result = verify_project(&backend, &GateThresholds::default()).await.unwrap();

        assert_eq!(result.score, 76);
        assert!(!result.passed);
        assert!(result.summary().contains("verification score 76"));
    }

    #[tokio::test]
    async fn test_missing_fields_read_as_neutral() {
        let backend = ScriptedBackend::new()
            .returning("generateProjectHealthReport", json!({}))
            .returning("validateDocumentationCompleteness", json!(null))
            .returning("validateCrossReferences", json!({}))
            .returning("checkDocumentationGaps", json!({}))
            .returning("findOrphanedReferences", json!({}))
            .returning("identifyNextCriticalTasks", json!({}));
        let result = verify_project(&backend, &GateThresholds::default()).await.unwrap();

        // 60 + 0 - 20 for incomplete docs
        assert_eq!(result.score, 40);
        assert_eq!(result.remaining_tasks, 0);
    }

    #[tokio::test]
    async fn test_task_verification_passes() {
        let backend = ScriptedBackend::healthy_project();
        let result = verify_task(&backend, "T-1").await.unwrap();

        assert!(result.passed);
        assert_eq!(result.summary(), "Task T-1 verified");
        let validation = &backend.calls_to("validateContextUnderstanding")[0];
        assert_eq!(validation["context"], json!({"id": "T-1", "title": "task"}));
    }

    #[tokio::test]
    async fn test_unknown_task_stops_early() {
        let backend = ScriptedBackend::healthy_project().returning("getContextById", Value::Null);
        let result = verify_task(&backend, "T-404").await.unwrap();

        assert!(!result.found);
        assert!(!result.passed);
        assert_eq!(backend.tools_called(), ["getContextById"]);
    }

    #[tokio::test]
    async fn test_cross_ref_issues_fail_task() {
        let backend = ScriptedBackend::healthy_project()
            .returning("validateCrossReferences", json!({"issues": [{"ref": "T-9"}]}));
        let result = verify_task(&backend, "T-1").await.unwrap();

        assert!(result.context_valid);
        assert!(!result.passed);
        assert_eq!(result.summary(), "Task T-1 has 1 cross-reference issue(s)");
    }

    #[tokio::test]
    async fn test_tool_error_propagates() {
        let backend = ScriptedBackend::healthy_project().failing("getContextById", "index offline");
        let err = verify_task(&backend, "T-1").await.unwrap_err();
        assert!(matches!(err, RpcError::Remote { .. }));
    }
}
