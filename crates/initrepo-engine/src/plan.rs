//! Implementation planning for a feature or task.
//!
//! Related ids are found by scanning the project's documentation for task
//! references on lines that mention the feature. The backend then supplies
//! context and briefs for the first matches and a dependency-ordered plan
//! for the tasks among them.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use initrepo_transport::RpcError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::backend::ToolBackend;
use crate::tools;

/// Documents searched for task references, relative to the project root.
pub const DOCUMENTATION_FILES: [&str; 9] = [
    "README.md",
    "AUTONOMOUS_WORKFLOW.md",
    "CLAUDE_PROJECT_BUILDER_AGENT.md",
    "CLAUDE_AGENT_USAGE_GUIDE.md",
    "docs/README.md",
    "docs/business_analysis.md",
    "docs/prd.md",
    "docs/user_stories.md",
    "docs/technical_architecture.md",
];

/// Matches whose context and brief are fetched
pub const MAX_CONTEXTS: usize = 5;

const TASK_PREFIX: &str = "T-";

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:T|F|US)-\d{3}\b").expect("reference pattern is valid"));
static EXACT_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:T|F|US)-\d+$").expect("reference pattern is valid"));

/// Task, feature and story ids related to `feature`, sorted and unique.
///
/// A feature that is itself an id resolves to that id. Otherwise every id on
/// a documentation line containing one of the feature's words (three or more
/// characters, case-insensitive) is related. Unreadable files are skipped.
#[must_use]
pub fn find_related_ids(project_root: &Path, feature: &str) -> Vec<String> {
    let feature = feature.trim();
    if EXACT_REFERENCE.is_match(feature) {
        return vec![feature.to_uppercase()];
    }

    let lowered = feature.to_lowercase();
    let keywords: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3)
        .collect();
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut ids = BTreeSet::new();
    for name in DOCUMENTATION_FILES {
        let path = project_root.join(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping documentation file");
                continue;
            }
        };
        for line in content.lines() {
            let line_lower = line.to_lowercase();
            if keywords.iter().any(|k| line_lower.contains(k)) {
                ids.extend(REFERENCE.find_iter(line).map(|m| m.as_str().to_string()));
            }
        }
    }
    ids.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub id: String,
    pub context: Value,
    /// Implementation brief, tasks only
    pub brief: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationPlan {
    pub feature: String,
    pub matches: Vec<String>,
    pub contexts: Vec<TaskContext>,
    /// Task ids among the matches, in match order
    pub task_ids: Vec<String>,
    pub recommended_order: Vec<String>,
    pub prerequisites: Vec<String>,
    pub estimated_effort: String,
    /// The backend's current critical tasks, for comparison with the plan
    pub critical_tasks: Vec<String>,
}

impl ImplementationPlan {
    #[must_use]
    pub fn summary(&self) -> String {
        match self.recommended_order.first() {
            Some(first) => format!(
                "Plan for \"{}\": {} task(s), start with {first}, estimated effort {}",
                self.feature,
                self.recommended_order.len(),
                self.estimated_effort
            ),
            None => format!(
                "Plan for \"{}\": no tasks among {} related item(s)",
                self.feature,
                self.matches.len()
            ),
        }
    }
}

/// Build the plan for `matches`, usually from [`find_related_ids`].
///
/// Context or brief failures only drop that entry. Dependency analysis and
/// critical-task failures fail the plan.
///
/// # Errors
///
/// Returns a fatal error from any call, or the first failing planning call.
pub async fn plan_implementation(
    backend: &dyn ToolBackend,
    feature: &str,
    matches: Vec<String>,
) -> Result<ImplementationPlan, RpcError> {
    let mut contexts = Vec::new();
    for id in matches.iter().take(MAX_CONTEXTS) {
        if let Some(context) = task_context(backend, id).await? {
            contexts.push(context);
        }
    }

    let task_ids: Vec<String> = matches
        .iter()
        .filter(|id| id.starts_with(TASK_PREFIX))
        .cloned()
        .collect();

    let mut arguments = Map::new();
    arguments.insert("taskIds".to_string(), json!(task_ids));
    let dependencies = backend
        .call_tool(tools::ANALYZE_TASK_DEPENDENCIES, arguments)
        .await?;
    let critical = backend
        .call_tool(tools::IDENTIFY_NEXT_CRITICAL_TASKS, Map::new())
        .await?;

    let recommended_order =
        tools::id_list(&dependencies, "implementationOrder").unwrap_or_else(|| task_ids.clone());
    let estimated_effort =
        tools::text(&dependencies, "estimatedEffort").unwrap_or_else(|| tools::UNKNOWN_EFFORT.to_string());
    let critical_tasks = critical
        .get("tasks")
        .and_then(Value::as_array)
        .map(|tasks| {
            tasks
                .iter()
                .filter_map(|t| t.get("id").and_then(tools::id_string))
                .collect()
        })
        .unwrap_or_default();
    info!(
        feature,
        matches = matches.len(),
        tasks = task_ids.len(),
        %estimated_effort,
        "Implementation plan ready"
    );

    Ok(ImplementationPlan {
        feature: feature.to_string(),
        contexts,
        prerequisites: tools::labels(&dependencies, "prerequisites"),
        recommended_order,
        estimated_effort,
        critical_tasks,
        task_ids,
        matches,
    })
}

async fn task_context(backend: &dyn ToolBackend, id: &str) -> Result<Option<TaskContext>, RpcError> {
    let mut arguments = Map::new();
    arguments.insert("id".to_string(), Value::String(id.to_string()));

    let context = match backend.call_tool(tools::GET_CONTEXT_BY_ID, arguments.clone()).await {
        Ok(Value::Null) => return Ok(None),
        Ok(context) => context,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(id, error = %e, "No context for related item");
            return Ok(None);
        }
    };

    let brief = if id.starts_with(TASK_PREFIX) {
        arguments.insert("includeTestingStrategy".to_string(), Value::Bool(true));
        match backend
            .call_tool(tools::GENERATE_SMART_IMPLEMENTATION_BRIEF, arguments)
            .await
        {
            Ok(brief) => Some(brief),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(id, error = %e, "No implementation brief");
                None
            }
        }
    } else {
        None
    };

    Ok(Some(TaskContext {
        id: id.to_string(),
        context,
        brief,
    }))
}
