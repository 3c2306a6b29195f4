//! Point-in-time project snapshot.
//!
//! Unlike verification there is no gate: a status check succeeds whenever the
//! backend answers, and the snapshot carries a recommended next action.

use std::collections::BTreeMap;

use initrepo_transport::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::backend::ToolBackend;
use crate::tools;

/// Health at or above this is reported as healthy.
pub const HEALTHY_SCORE: f64 = 85.0;
/// Health at or above this is ready for implementation.
pub const READY_SCORE: f64 = 60.0;

const PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBand {
    Healthy,
    Fair,
    Poor,
}

impl HealthBand {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= HEALTHY_SCORE {
            Self::Healthy
        } else if score >= READY_SCORE {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    /// Health is too low to build on
    FixIssues,
    /// Critical tasks are still pending
    ContinueBuilding,
    /// Nothing pending; check the finished work
    VerifyWork,
}

impl NextAction {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::FixIssues => "Address documentation gaps and project health issues",
            Self::ContinueBuilding => "Run `initrepo agent` to continue implementing pending tasks",
            Self::VerifyWork => "Run `initrepo verify` to validate the completed work",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: Option<String>,
    /// Backend-reported status, `pending` when absent
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub name: Option<String>,
    pub path: Option<String>,
    pub last_updated: Option<String>,
    pub health_score: f64,
    pub health_band: HealthBand,
    pub doc_complete: bool,
    pub ready_for_implementation: bool,
    pub critical_tasks: Vec<TaskSummary>,
    pub documentation_gaps: Vec<String>,
    pub next_action: NextAction,
}

impl ProjectStatus {
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Health {}% ({}), {} critical task(s), {} documentation gap(s)",
            self.health_score,
            self.health_band.as_str(),
            self.critical_tasks.len(),
            self.documentation_gaps.len()
        )
    }

    /// Critical tasks grouped by status, statuses in name order.
    #[must_use]
    pub fn tasks_by_status(&self) -> BTreeMap<&str, Vec<&TaskSummary>> {
        let mut groups: BTreeMap<&str, Vec<&TaskSummary>> = BTreeMap::new();
        for task in &self.critical_tasks {
            groups.entry(task.status.as_str()).or_default().push(task);
        }
        groups
    }
}

/// Gather the project snapshot.
///
/// # Errors
///
/// Returns the first failing tool call.
pub async fn project_status(backend: &dyn ToolBackend) -> Result<ProjectStatus, RpcError> {
    let project = backend
        .call_tool(tools::GET_PROJECT_STATUS, Map::new())
        .await?;
    let health = backend
        .call_tool(tools::GENERATE_PROJECT_HEALTH_REPORT, Map::new())
        .await?;
    let critical = backend
        .call_tool(tools::IDENTIFY_NEXT_CRITICAL_TASKS, Map::new())
        .await?;
    let docs = backend
        .call_tool(tools::VALIDATE_DOCUMENTATION_COMPLETENESS, Map::new())
        .await?;
    let gaps = backend
        .call_tool(tools::CHECK_DOCUMENTATION_GAPS, Map::new())
        .await?;

    let health_score = tools::health_score(&health);
    let critical_tasks = task_summaries(&critical);
    let next_action = if health_score < READY_SCORE {
        NextAction::FixIssues
    } else if critical_tasks.iter().any(|t| t.status == PENDING) {
        NextAction::ContinueBuilding
    } else {
        NextAction::VerifyWork
    };
    info!(health_score, tasks = critical_tasks.len(), ?next_action, "Project status gathered");

    Ok(ProjectStatus {
        name: tools::text(&project, "name"),
        path: tools::text(&project, "path").or_else(|| tools::text(&project, "projectRoot")),
        last_updated: tools::text(&project, "lastUpdated"),
        health_score,
        health_band: HealthBand::from_score(health_score),
        doc_complete: tools::flag(&docs, "isComplete"),
        ready_for_implementation: health_score >= READY_SCORE,
        critical_tasks,
        documentation_gaps: tools::labels(&gaps, "gaps"),
        next_action,
    })
}

fn task_summaries(payload: &Value) -> Vec<TaskSummary> {
    let Some(tasks) = payload.get("tasks").and_then(Value::as_array) else {
        return Vec::new();
    };
    tasks
        .iter()
        .filter_map(|task| {
            Some(TaskSummary {
                id: task.get("id").and_then(tools::id_string)?,
                title: tools::text(task, "title").or_else(|| tools::text(task, "description")),
                status: tools::text(task, "status").unwrap_or_else(|| PENDING.to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_status_calls_five_tools_in_order() {
        let backend = ScriptedBackend::healthy_project();
        let status = project_status(&backend).await.unwrap();

        assert_eq!(
            backend.tools_called(),
            [
                "getProjectStatus",
                "generateProjectHealthReport",
                "identifyNextCriticalTasks",
                "validateDocumentationCompleteness",
                "checkDocumentationGaps",
            ]
        );
        assert_eq!(status.health_band, HealthBand::Healthy);
        assert!(status.doc_complete);
        assert!(status.ready_for_implementation);
        assert_eq!(status.critical_tasks.len(), 3);
        assert_eq!(status.next_action, NextAction::ContinueBuilding);
        assert_eq!(
            status.summary(),
            "Health 90% (healthy), 3 critical task(s), 0 documentation gap(s)"
        );
    }

    #[tokio::test]
    async fn test_low_health_recommends_fixing_issues() {
        let backend = ScriptedBackend::healthy_project()
            .returning("generateProjectHealthReport", json!({"healthScore": 59.5}))
            .returning("checkDocumentationGaps", json!({"gaps": [{"description": "API reference"}, "deploy"]}));
        let status = project_status(&backend).await.unwrap();

        assert_eq!(status.health_band, HealthBand::Poor);
        assert!(!status.ready_for_implementation);
        assert_eq!(status.next_action, NextAction::FixIssues);
        assert_eq!(status.documentation_gaps, ["API reference", "deploy"]);
    }

    #[tokio::test]
    async fn test_finished_tasks_recommend_verification() {
        let backend = ScriptedBackend::healthy_project()
            .returning("generateProjectHealthReport", json!({"healthScore": 70}))
            .returning(
                "identifyNextCriticalTasks",
                json!({"tasks": [
                    {"id": "T-1", "status": "completed", "title": "Login"},
                    {"id": "T-2", "status": "blocked", "description": "Billing"},
                    {"id": "T-3", "status": "completed"}
                ]}),
            );
        let status = project_status(&backend).await.unwrap();

        assert_eq!(status.health_band, HealthBand::Fair);
        assert_eq!(status.next_action, NextAction::VerifyWork);
        let groups = status.tasks_by_status();
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), ["blocked", "completed"]);
        assert_eq!(groups["completed"].len(), 2);
        assert_eq!(groups["blocked"][0].title.as_deref(), Some("Billing"));
    }

    #[tokio::test]
    async fn test_project_fields_are_optional() {
        let backend = ScriptedBackend::healthy_project().returning(
            "getProjectStatus",
            json!({"name": "shop", "projectRoot": "/srv/shop", "lastUpdated": "2026-10-01"}),
        );
        let status = project_status(&backend).await.unwrap();
        assert_eq!(status.name.as_deref(), Some("shop"));
        assert_eq!(status.path.as_deref(), Some("/srv/shop"));
        assert_eq!(status.last_updated.as_deref(), Some("2026-10-01"));

        let bare = project_status(&ScriptedBackend::healthy_project()).await.unwrap();
        assert_eq!(bare.name, None);
        assert_eq!(bare.path, None);
    }

    #[tokio::test]
    async fn test_tool_error_propagates() {
        let backend = ScriptedBackend::healthy_project().failing("identifyNextCriticalTasks", "index offline");
        let err = project_status(&backend).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote { .. }));
        assert_eq!(backend.tools_called().len(), 3);
    }
}
