//! Autonomous run engine.
//!
//! - [`backend`]: the [`ToolBackend`] seam and its RPC implementation
//! - [`executor`]: per-item step sequences with fault isolation
//! - [`orchestrator`]: the Discovery -> Planning -> Implementation ->
//!   QualityAssurance state machine
//! - [`verify`]: project and single-task verification
//! - [`status`]: point-in-time project snapshot
//! - [`plan`]: implementation plans for a feature or task
//! - [`tools`]: tool names and tolerant payload readers

pub mod backend;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod status;
pub mod tools;
pub mod verify;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{RpcBackend, ToolBackend};
pub use error::EngineError;
pub use executor::{
    ArgSource, CompletedItem, ExecutionOutcome, FailedItem, ItemFailure, Priority, StepSpec,
    TaskExecutor, WorkItem,
};
pub use orchestrator::{
    FailedTask, OrchestratorSettings, PhaseData, PhaseOrchestrator, PhaseResult, RunOutcome,
    RunReport, RunState, implementation_steps,
};
pub use plan::{ImplementationPlan, TaskContext, find_related_ids, plan_implementation};
pub use status::{HealthBand, NextAction, ProjectStatus, TaskSummary, project_status};
pub use verify::{ProjectVerification, TaskVerification, verify_project, verify_task};
