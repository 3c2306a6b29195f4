//! Work-item execution.
//!
//! Every item in a queue runs the same ordered list of [`StepSpec`]s. A failed
//! step ends that item only; the queue keeps going. The only error that
//! escapes [`TaskExecutor::run`] is loss of the backend connection.

use std::sync::Arc;
use std::time::Duration;

use initrepo_transport::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::backend::ToolBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
}

/// One schedulable task, immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl WorkItem {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: Priority::Normal,
            rationale: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// Where a step argument's value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSource {
    /// The item's id as a string
    ItemId,
    Literal(Value),
    /// The output of an earlier step of the same item
    StepOutput(usize),
}

/// One tool call in an item's step sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    pub tool: String,
    pub args: Vec<(String, ArgSource)>,
    /// Boolean result field that must be `true` for the step to succeed
    pub accept_if: Option<String>,
}

impl StepSpec {
    #[must_use]
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            args: Vec::new(),
            accept_if: None,
        }
    }

    #[must_use]
    pub fn item_id(mut self, name: impl Into<String>) -> Self {
        self.args.push((name.into(), ArgSource::ItemId));
        self
    }

    #[must_use]
    pub fn literal(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.push((name.into(), ArgSource::Literal(value)));
        self
    }

    #[must_use]
    pub fn output_of(mut self, name: impl Into<String>, step: usize) -> Self {
        self.args.push((name.into(), ArgSource::StepOutput(step)));
        self
    }

    #[must_use]
    pub fn accept_if(mut self, field: impl Into<String>) -> Self {
        self.accept_if = Some(field.into());
        self
    }

    fn arguments(&self, item: &WorkItem, outputs: &[Value]) -> Result<Map<String, Value>, ItemFailure> {
        self.args
            .iter()
            .map(|(name, source)| {
                let value = match source {
                    ArgSource::ItemId => Value::String(item.id.clone()),
                    ArgSource::Literal(value) => value.clone(),
                    ArgSource::StepOutput(index) => outputs.get(*index).cloned().ok_or_else(|| {
                        ItemFailure::BadStepReference {
                            tool: self.tool.clone(),
                            index: *index,
                        }
                    })?,
                };
                Ok((name.clone(), value))
            })
            .collect()
    }
}

/// Why a single item failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemFailure {
    #[error("{0}")]
    Call(#[source] RpcError),

    #[error("{tool} rejected {id}")]
    Rejected { tool: String, id: String },

    #[error("{tool} refers to step {index}, which has not run")]
    BadStepReference { tool: String, index: usize },
}

impl ItemFailure {
    fn fatal(&self) -> Option<&RpcError> {
        match self {
            Self::Call(e) if e.is_fatal() => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedItem {
    pub item: WorkItem,
    /// One output per step, in step order
    pub outputs: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem {
    pub item: WorkItem,
    /// Index of the failing step
    pub step: usize,
    pub tool: String,
    pub failure: ItemFailure,
}

impl FailedItem {
    #[must_use]
    pub fn reason(&self) -> String {
        self.failure.to_string()
    }
}

/// Per-queue result. `completed.len() + failed.len()` is the queue length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub completed: Vec<CompletedItem>,
    pub failed: Vec<FailedItem>,
}

impl ExecutionOutcome {
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// completed / total, or 0 for an empty queue.
    #[must_use]
    pub fn success_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            #[allow(clippy::cast_precision_loss)]
            total => self.completed.len() as f64 / total as f64,
        }
    }
}

type ItemResult = Result<Vec<Value>, (usize, ItemFailure)>;

pub struct TaskExecutor {
    backend: Arc<dyn ToolBackend>,
    pacing: Duration,
    max_parallel: usize,
}

impl TaskExecutor {
    #[must_use]
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            backend,
            pacing: Duration::ZERO,
            max_parallel: 1,
        }
    }

    /// Delay after each completed item. Zero disables pacing.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Items in flight at once; values below 1 are treated as 1.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Run `steps` for every item in `queue`.
    ///
    /// Outcomes are reported in queue order regardless of parallelism.
    ///
    /// # Errors
    ///
    /// Returns the fatal `RpcError` (transport loss) as soon as any item hits
    /// it; remaining items are not run.
    pub async fn run(&self, queue: &[WorkItem], steps: &[StepSpec]) -> Result<ExecutionOutcome, RpcError> {
        info!(
            items = queue.len(),
            steps = steps.len(),
            max_parallel = self.max_parallel,
            "Executing work items"
        );

        let results = if self.max_parallel == 1 {
            self.run_sequential(queue, steps).await?
        } else {
            self.run_parallel(queue, steps).await?
        };

        let mut outcome = ExecutionOutcome::default();
        for (item, result) in queue.iter().zip(results) {
            match result {
                Ok(outputs) => outcome.completed.push(CompletedItem {
                    item: item.clone(),
                    outputs,
                }),
                Err((step, failure)) => {
                    warn!(item = %item.id, step, error = %failure, "Work item failed");
                    outcome.failed.push(FailedItem {
                        item: item.clone(),
                        step,
                        tool: steps.get(step).map(|s| s.tool.clone()).unwrap_or_default(),
                        failure,
                    });
                }
            }
        }

        info!(
            completed = outcome.completed.len(),
            failed = outcome.failed.len(),
            success_ratio = outcome.success_ratio(),
            "Work items finished"
        );
        Ok(outcome)
    }

    async fn run_sequential(&self, queue: &[WorkItem], steps: &[StepSpec]) -> Result<Vec<ItemResult>, RpcError> {
        let mut results = Vec::with_capacity(queue.len());
        for item in queue {
            let result = run_item(self.backend.as_ref(), item, steps).await;
            if let Err((_, failure)) = &result
                && let Some(fatal) = failure.fatal()
            {
                return Err(fatal.clone());
            }
            if result.is_ok() {
                pace(self.pacing).await;
            }
            results.push(result);
        }
        Ok(results)
    }

    async fn run_parallel(&self, queue: &[WorkItem], steps: &[StepSpec]) -> Result<Vec<ItemResult>, RpcError> {
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let steps: Arc<[StepSpec]> = steps.into();
        let mut set = JoinSet::new();

        for (index, item) in queue.iter().cloned().enumerate() {
            let backend = Arc::clone(&self.backend);
            let steps = Arc::clone(&steps);
            let permits = Arc::clone(&permits);
            let pacing = self.pacing;
            set.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let result = run_item(backend.as_ref(), &item, &steps).await;
                if result.is_ok() {
                    pace(pacing).await;
                }
                (index, result)
            });
        }

        let mut results: Vec<Option<ItemResult>> = vec![None; queue.len()];
        while let Some(joined) = set.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => continue,
            };
            if let Err((_, failure)) = &result
                && let Some(fatal) = failure.fatal()
            {
                set.abort_all();
                return Err(fatal.clone());
            }
            results[index] = Some(result);
        }

        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or(Err((0, ItemFailure::Call(RpcError::TransportClosed)))))
            .collect())
    }
}

async fn run_item(backend: &dyn ToolBackend, item: &WorkItem, steps: &[StepSpec]) -> ItemResult {
    debug!(item = %item.id, "Running work item");
    let mut outputs = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let arguments = step.arguments(item, &outputs).map_err(|f| (index, f))?;
        let output = backend
            .call_tool(&step.tool, arguments)
            .await
            .map_err(|e| (index, ItemFailure::Call(e)))?;

        if let Some(field) = &step.accept_if
            && output.get(field).and_then(Value::as_bool) != Some(true)
        {
            return Err((
                index,
                ItemFailure::Rejected {
                    tool: step.tool.clone(),
                    id: item.id.clone(),
                },
            ));
        }
        outputs.push(output);
    }

    Ok(outputs)
}

async fn pace(pacing: Duration) {
    if !pacing.is_zero() {
        tokio::time::sleep(pacing).await;
    }
}
