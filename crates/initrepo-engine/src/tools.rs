//! Backend tool names and tolerant payload readers.
//!
//! Payload readers treat a missing or mistyped field as its neutral value
//! (0, false, empty) rather than an error.

use serde_json::Value;

pub const GET_PROJECT_STATUS: &str = "getProjectStatus";
pub const GENERATE_PROJECT_HEALTH_REPORT: &str = "generateProjectHealthReport";
pub const VALIDATE_DOCUMENTATION_COMPLETENESS: &str = "validateDocumentationCompleteness";
pub const LIST_PROJECTS: &str = "listProjects";
pub const IDENTIFY_NEXT_CRITICAL_TASKS: &str = "identifyNextCriticalTasks";
pub const ANALYZE_TASK_DEPENDENCIES: &str = "analyzeTaskDependencies";
pub const GENERATE_TASK_SCHEDULE: &str = "generateTaskSchedule";
pub const GET_CONTEXT_BY_ID: &str = "getContextById";
pub const GENERATE_SMART_IMPLEMENTATION_BRIEF: &str = "generateSmartImplementationBrief";
pub const VALIDATE_CONTEXT_UNDERSTANDING: &str = "validateContextUnderstanding";
pub const VALIDATE_CROSS_REFERENCES: &str = "validateCrossReferences";
pub const CHECK_DOCUMENTATION_GAPS: &str = "checkDocumentationGaps";
pub const FIND_ORPHANED_REFERENCES: &str = "findOrphanedReferences";

/// Effort reported when dependency analysis gives no estimate
pub const UNKNOWN_EFFORT: &str = "Unknown";

/// Outcome of unwrapping an MCP tool result
#[derive(Debug, Clone, PartialEq)]
pub enum ToolPayload {
    Value(Value),
    /// The tool ran but flagged its own output as an error
    ToolError(String),
}

/// Strip the MCP `{"content": [{"type": "text", "text": ...}]}` envelope.
///
/// Text content holding JSON is parsed; other text is returned as a string.
/// Results without the envelope pass through unchanged.
#[must_use]
pub fn unwrap_content(result: Value) -> ToolPayload {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return ToolPayload::Value(result);
    };

    let text: String = content
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return ToolPayload::ToolError(text);
    }

    match serde_json::from_str(&text) {
        Ok(parsed) => ToolPayload::Value(parsed),
        Err(_) => ToolPayload::Value(Value::String(text)),
    }
}

/// `healthScore`, or 0
#[must_use]
pub fn health_score(payload: &Value) -> f64 {
    payload
        .get("healthScore")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// A boolean field, false unless literally `true`
#[must_use]
pub fn flag(payload: &Value, field: &str) -> bool {
    payload.get(field).and_then(Value::as_bool).unwrap_or(false)
}

/// Length of an array field, or 0
#[must_use]
pub fn count(payload: &Value, field: &str) -> u32 {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map_or(0, |items| u32::try_from(items.len()).unwrap_or(u32::MAX))
}

/// Render an id that may be a string or a number.
#[must_use]
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Array field of ids, when present
#[must_use]
pub fn id_list(payload: &Value, field: &str) -> Option<Vec<String>> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(id_string).collect())
}

/// A field rendered as text: strings as-is, other non-null values as JSON
#[must_use]
pub fn text(payload: &Value, field: &str) -> Option<String> {
    match payload.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Human-readable label for a list entry such as a gap or prerequisite.
///
/// Strings are used directly; objects use their `description`, `issue` or
/// `title`, in that order.
#[must_use]
pub fn label(entry: &Value) -> String {
    match entry {
        Value::String(s) => s.clone(),
        Value::Object(fields) => ["description", "issue", "title"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))
            .map_or_else(|| entry.to_string(), str::to_string),
        other => other.to_string(),
    }
}

/// Labels of an array field, or empty
#[must_use]
pub fn labels(payload: &Value, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(label).collect())
        .unwrap_or_default()
}
