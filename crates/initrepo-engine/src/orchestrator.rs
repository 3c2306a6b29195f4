//! The autonomous run state machine.
//!
//! ```text
//! Discovery -> Planning -> Implementation -> QualityAssurance -> Done
//!     \            \              \                  \
//!      +------------+--------------+------------------+--> Aborted
//! ```
//!
//! Transitions are strictly forward with no retries. A failed tool call or
//! gate aborts the run with a report; only loss of the backend connection
//! escapes [`PhaseOrchestrator::run`] as an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use initrepo_config::Config;
use initrepo_config::defaults;
use initrepo_scoring::{GateResult, GateThresholds, quality_score};
use initrepo_transport::RpcError;
use initrepo_utils::logging::{log_phase_complete, log_phase_error, log_phase_start, phase_span};
use initrepo_utils::{ExitCode, PhaseId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tracing::{Instrument, info};

use crate::backend::ToolBackend;
use crate::error::EngineError;
use crate::executor::{Priority, StepSpec, TaskExecutor, WorkItem};
use crate::tools;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum RunState {
    Active(PhaseId),
    Done,
    Aborted,
}

/// What each phase learned, for the run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseData {
    Discovery {
        health_score: f64,
        ready_for_implementation: bool,
        project_count: u32,
    },
    Planning {
        critical_task_count: usize,
        /// Work items in implementation order
        queue: Vec<WorkItem>,
        estimated_effort: String,
    },
    Implementation {
        total: usize,
        completed: Vec<String>,
        failed: Vec<FailedTask>,
        success_ratio: f64,
    },
    QualityAssurance {
        issue_count: u32,
        gap_count: u32,
        orphan_count: u32,
        final_health: f64,
        quality_score: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTask {
    pub id: String,
    pub tool: String,
    pub reason: String,
}

/// One phase transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: PhaseId,
    pub success: bool,
    /// 0-100
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PhaseData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<GateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub phases: Vec<PhaseResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self.outcome {
            RunOutcome::Done => ExitCode::SUCCESS,
            RunOutcome::Aborted => ExitCode::FAILURE,
        }
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match (self.outcome, self.phases.last()) {
            (RunOutcome::Done, _) => format!(
                "Run {} completed: {} phases passed in {} ms",
                self.run_id,
                self.phases.len(),
                self.duration_ms
            ),
            (RunOutcome::Aborted, Some(last)) => format!(
                "Run {} aborted in {}: {}",
                self.run_id,
                last.phase,
                self.reason.as_deref().unwrap_or("unknown reason")
            ),
            (RunOutcome::Aborted, None) => format!("Run {} aborted", self.run_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    pub gates: GateThresholds,
    /// Pause after each completed work item
    pub item_pacing: Duration,
    pub max_parallel: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            gates: GateThresholds::default(),
            item_pacing: Duration::from_millis(defaults::ITEM_PACING_MS),
            max_parallel: defaults::MAX_PARALLEL,
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            gates: config.gate_thresholds(),
            item_pacing: config.item_pacing(),
            max_parallel: config.max_parallel(),
        }
    }
}

/// Result of one phase body before it becomes a [`PhaseResult`]
struct PhaseStep {
    data: PhaseData,
    score: u8,
    gate: Option<GateResult>,
}

impl PhaseStep {
    fn ungated(data: PhaseData, score: u8) -> Self {
        Self {
            data,
            score,
            gate: None,
        }
    }
}

/// Drives one backend through a full run. Single use.
pub struct PhaseOrchestrator {
    backend: Arc<dyn ToolBackend>,
    settings: OrchestratorSettings,
    state: RunState,
    started: bool,
}

impl PhaseOrchestrator {
    #[must_use]
    pub fn new(backend: Arc<dyn ToolBackend>, settings: OrchestratorSettings) -> Self {
        Self {
            backend,
            settings,
            state: RunState::Active(PhaseId::Discovery),
            started: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run every phase in order until one fails or all pass.
    ///
    /// # Errors
    ///
    /// - [`EngineError::AlreadyRun`] on a second call
    /// - [`EngineError::TransportLost`] when the backend connection is lost;
    ///   the state becomes [`RunState::Aborted`]
    pub async fn run(&mut self) -> Result<RunReport, EngineError> {
        if self.started {
            return Err(EngineError::AlreadyRun);
        }
        self.started = true;

        let started_at = Utc::now();
        let run_id = format!("run-{}", started_at.format("%Y%m%dT%H%M%S%3fZ"));
        let clock = Instant::now();
        info!(run_id = %run_id, "Starting autonomous run");

        let mut phases = Vec::with_capacity(PhaseId::ALL.len());
        let mut queue: Vec<WorkItem> = Vec::new();
        let mut success_ratio = 0.0;

        let mut next = Some(PhaseId::Discovery);
        while let Some(phase) = next {
            self.state = RunState::Active(phase);
            log_phase_start(&run_id, phase.as_str());
            let phase_clock = Instant::now();

            let attempt = async {
                match phase {
                    PhaseId::Discovery => self.discover().await,
                    PhaseId::Planning => self.plan().await,
                    PhaseId::Implementation => self.implement(&queue).await,
                    PhaseId::QualityAssurance => self.assure_quality(success_ratio).await,
                }
            }
            .instrument(phase_span(&run_id, phase.as_str()))
            .await;
            let duration_ms = elapsed_ms(phase_clock);

            let result = match attempt {
                Ok(step) => {
                    match &step.data {
                        PhaseData::Planning { queue: planned, .. } => queue.clone_from(planned),
                        PhaseData::Implementation {
                            success_ratio: ratio,
                            ..
                        } => success_ratio = *ratio,
                        _ => {}
                    }
                    PhaseResult::from_step(phase, step, duration_ms)
                }
                Err(e) if e.is_fatal() => {
                    self.state = RunState::Aborted;
                    log_phase_error(&run_id, phase.as_str(), &e.to_string(), u128::from(duration_ms));
                    return Err(EngineError::TransportLost { phase, source: e });
                }
                Err(e) => PhaseResult::failed(phase, format!("{phase} phase failed: {e}"), duration_ms),
            };

            if !result.success {
                let reason = result.reason.clone().unwrap_or_default();
                log_phase_error(&run_id, phase.as_str(), &reason, u128::from(duration_ms));
                phases.push(result);
                self.state = RunState::Aborted;
                return Ok(RunReport {
                    run_id,
                    outcome: RunOutcome::Aborted,
                    phases,
                    reason: Some(reason),
                    started_at,
                    duration_ms: elapsed_ms(clock),
                });
            }

            log_phase_complete(&run_id, phase.as_str(), result.score, u128::from(duration_ms));
            phases.push(result);
            next = phase.next();
        }

        self.state = RunState::Done;
        let report = RunReport {
            run_id,
            outcome: RunOutcome::Done,
            phases,
            reason: None,
            started_at,
            duration_ms: elapsed_ms(clock),
        };
        info!(run_id = %report.run_id, duration_ms = report.duration_ms, "Run completed");
        Ok(report)
    }

    async fn call(&self, tool: &str, arguments: Map<String, Value>) -> Result<Value, RpcError> {
        self.backend.call_tool(tool, arguments).await
    }

    async fn discover(&self) -> Result<PhaseStep, RpcError> {
        self.call(tools::GET_PROJECT_STATUS, Map::new()).await?;
        let health = self.call(tools::GENERATE_PROJECT_HEALTH_REPORT, Map::new()).await?;
        let docs = self
            .call(tools::VALIDATE_DOCUMENTATION_COMPLETENESS, Map::new())
            .await?;
        let projects = self.call(tools::LIST_PROJECTS, Map::new()).await?;

        let health_score = tools::health_score(&health);
        let ready_for_implementation = tools::flag(&docs, "isComplete");
        info!(health_score, ready_for_implementation, "Discovery complete");

        Ok(PhaseStep::ungated(
            PhaseData::Discovery {
                health_score,
                ready_for_implementation,
                project_count: tools::count(&projects, "projects"),
            },
            percent(health_score),
        ))
    }

    async fn plan(&self) -> Result<PhaseStep, RpcError> {
        let critical = self.call(tools::IDENTIFY_NEXT_CRITICAL_TASKS, Map::new()).await?;
        let tasks = critical_tasks(&critical);
        let task_ids: Vec<Value> = tasks.iter().map(|t| Value::String(t.id.clone())).collect();

        let mut arguments = Map::new();
        arguments.insert("taskIds".to_string(), Value::Array(task_ids));
        let dependencies = self
            .call(tools::ANALYZE_TASK_DEPENDENCIES, arguments.clone())
            .await?;
        self.call(tools::GENERATE_TASK_SCHEDULE, arguments).await?;

        let queue = match tools::id_list(&dependencies, "implementationOrder") {
            Some(order) => order
                .into_iter()
                .map(|id| {
                    tasks
                        .iter()
                        .find(|t| t.id == id)
                        .cloned()
                        .unwrap_or_else(|| WorkItem::new(id))
                })
                .collect(),
            None => tasks.clone(),
        };
        let estimated_effort =
            tools::text(&dependencies, "estimatedEffort").unwrap_or_else(|| tools::UNKNOWN_EFFORT.to_string());
        info!(tasks = tasks.len(), queued = queue.len(), %estimated_effort, "Planning complete");

        Ok(PhaseStep::ungated(
            PhaseData::Planning {
                critical_task_count: tasks.len(),
                queue,
                estimated_effort,
            },
            100,
        ))
    }

    async fn implement(&self, queue: &[WorkItem]) -> Result<PhaseStep, RpcError> {
        let executor = TaskExecutor::new(Arc::clone(&self.backend))
            .with_pacing(self.settings.item_pacing)
            .with_max_parallel(self.settings.max_parallel);
        let outcome = executor.run(queue, &implementation_steps()).await?;

        let success_ratio = outcome.success_ratio();
        let gate = self.settings.gates.implementation(success_ratio);
        Ok(PhaseStep {
            data: PhaseData::Implementation {
                total: outcome.total(),
                completed: outcome.completed.iter().map(|c| c.item.id.clone()).collect(),
                failed: outcome
                    .failed
                    .iter()
                    .map(|f| FailedTask {
                        id: f.item.id.clone(),
                        tool: f.tool.clone(),
                        reason: f.reason(),
                    })
                    .collect(),
                success_ratio,
            },
            score: percent(success_ratio * 100.0),
            gate: Some(gate),
        })
    }

    async fn assure_quality(&self, success_ratio: f64) -> Result<PhaseStep, RpcError> {
        let cross_refs = self.call(tools::VALIDATE_CROSS_REFERENCES, Map::new()).await?;
        let gaps = self.call(tools::CHECK_DOCUMENTATION_GAPS, Map::new()).await?;
        let orphans = self.call(tools::FIND_ORPHANED_REFERENCES, Map::new()).await?;
        let health = self.call(tools::GENERATE_PROJECT_HEALTH_REPORT, Map::new()).await?;

        let issue_count = tools::count(&cross_refs, "issues");
        let gap_count = tools::count(&gaps, "gaps");
        let orphan_count = tools::count(&orphans, "orphanedReferences");
        let final_health = tools::health_score(&health);
        let quality = quality_score(issue_count, gap_count, orphan_count);

        let gate = self
            .settings
            .gates
            .quality_assurance(final_health, quality, success_ratio);
        Ok(PhaseStep {
            data: PhaseData::QualityAssurance {
                issue_count,
                gap_count,
                orphan_count,
                final_health,
                quality_score: quality,
            },
            score: quality,
            gate: Some(gate),
        })
    }
}

impl PhaseResult {
    fn from_step(phase: PhaseId, step: PhaseStep, duration_ms: u64) -> Self {
        let success = step.gate.as_ref().is_none_or(|g| g.passed);
        let reason = step
            .gate
            .as_ref()
            .filter(|g| !g.passed)
            .map(|g| format!("{phase} gate failed: {}", g.reason()));
        Self {
            phase,
            success,
            score: step.score,
            data: Some(step.data),
            gate: step.gate,
            reason,
            duration_ms,
        }
    }

    fn failed(phase: PhaseId, reason: String, duration_ms: u64) -> Self {
        Self {
            phase,
            success: false,
            score: 0,
            data: None,
            gate: None,
            reason: Some(reason),
            duration_ms,
        }
    }
}

/// Steps run for every work item during implementation.
#[must_use]
pub fn implementation_steps() -> Vec<StepSpec> {
    vec![
        StepSpec::new(tools::GET_CONTEXT_BY_ID).item_id("id"),
        StepSpec::new(tools::GENERATE_SMART_IMPLEMENTATION_BRIEF)
            .item_id("id")
            .literal("includeTestingStrategy", json!(true)),
        StepSpec::new(tools::VALIDATE_CONTEXT_UNDERSTANDING)
            .item_id("id")
            .output_of("context", 0)
            .accept_if("isValid"),
    ]
}

fn critical_tasks(payload: &Value) -> Vec<WorkItem> {
    let Some(tasks) = payload.get("tasks").and_then(Value::as_array) else {
        return Vec::new();
    };
    tasks
        .iter()
        .filter_map(|task| {
            let id = task.get("id").and_then(tools::id_string)?;
            let priority = match task.get("priority").and_then(Value::as_str) {
                Some("critical") => Priority::Critical,
                Some("high") => Priority::High,
                _ => Priority::Normal,
            };
            let rationale = ["rationale", "reason"]
                .iter()
                .find_map(|key| task.get(*key).and_then(Value::as_str))
                .map(str::to_string);
            Some(WorkItem {
                id,
                priority,
                rationale,
            })
        })
        .collect()
}

/// Round into 0..=100; NaN reads as 0.
fn percent(value: f64) -> u8 {
    if value.is_finite() {
        // Clamped to 0..=100 first
        value.clamp(0.0, 100.0).round() as u8
    } else {
        0
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
