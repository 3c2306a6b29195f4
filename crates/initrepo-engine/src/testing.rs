//! In-memory [`ToolBackend`] for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use initrepo_transport::RpcError;
use serde_json::{Map, Value, json};

use crate::backend::ToolBackend;

type Handler = Arc<dyn Fn(&Map<String, Value>) -> Result<Value, RpcError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub tool: String,
    pub arguments: Map<String, Value>,
}

/// Answers tool calls from per-tool closures and records every call.
///
/// Tools without a handler fail with a remote "unknown tool" error.
#[derive(Default)]
pub struct ScriptedBackend {
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `tool` with `handler`, replacing any earlier handler.
    #[must_use]
    pub fn on<F>(mut self, tool: &str, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        self.handlers.insert(tool.to_string(), Arc::new(handler));
        self
    }

    #[must_use]
    pub fn returning(self, tool: &str, value: Value) -> Self {
        self.on(tool, move |_| Ok(value.clone()))
    }

    #[must_use]
    pub fn failing(self, tool: &str, message: &str) -> Self {
        let (name, message) = (tool.to_string(), message.to_string());
        self.on(tool, move |_| {
            Err(RpcError::Remote {
                tool: name.clone(),
                message: message.clone(),
                code: None,
            })
        })
    }

    /// A project that passes every phase: three tasks, health 90, no issues.
    #[must_use]
    pub fn healthy_project() -> Self {
        Self::new()
            .returning("getProjectStatus", json!({"status": "active"}))
            .returning("generateProjectHealthReport", json!({"healthScore": 90}))
            .returning("validateDocumentationCompleteness", json!({"isComplete": true}))
            .returning("listProjects", json!({"projects": [{"name": "demo"}]}))
            .returning(
                "identifyNextCriticalTasks",
                json!({"tasks": [
                    {"id": "T-1", "priority": "critical", "reason": "unblocks auth"},
                    {"id": "T-2", "priority": "high"},
                    {"id": "T-3"}
                ]}),
            )
            .returning(
                "analyzeTaskDependencies",
                json!({"implementationOrder": ["T-2", "T-1", "T-3"]}),
            )
            .returning("generateTaskSchedule", json!({"schedule": []}))
            .on("getContextById", |args| Ok(json!({"id": args["id"], "title": "task"})))
            .returning("generateSmartImplementationBrief", json!({"brief": "do it"}))
            .returning("validateContextUnderstanding", json!({"isValid": true}))
            .returning("validateCrossReferences", json!({"issues": []}))
            .returning("checkDocumentationGaps", json!({"gaps": []}))
            .returning("findOrphanedReferences", json!({"orphanedReferences": []}))
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Arguments of every call to `tool`, in call order.
    #[must_use]
    pub fn calls_to(&self, tool: &str) -> Vec<Map<String, Value>> {
        self.calls()
            .into_iter()
            .filter(|c| c.tool == tool)
            .map(|c| c.arguments)
            .collect()
    }

    #[must_use]
    pub fn tools_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.tool).collect()
    }
}

#[async_trait]
impl ToolBackend for ScriptedBackend {
    async fn call_tool(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                tool: tool.to_string(),
                arguments: arguments.clone(),
            });

        // Yield so concurrent callers interleave the way real calls do
        tokio::task::yield_now().await;

        match self.handlers.get(tool) {
            Some(handler) => handler(&arguments),
            None => Err(RpcError::Remote {
                tool: tool.to_string(),
                message: format!("unknown tool: {tool}"),
                code: None,
            }),
        }
    }
}
