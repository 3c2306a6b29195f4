//! initrepo - autonomous phase-driven build agent for InitRepo MCP backends
//!
//! The agent launches the InitRepo MCP server as a child process, speaks
//! newline-delimited JSON to it over stdio, and drives it through four gated
//! phases: Discovery, Planning, Implementation and QualityAssurance.
//!
//! initrepo can be used in two ways:
//! - **CLI**: run `initrepo agent`, `initrepo status`, `initrepo implement`,
//!   `initrepo verify` or `initrepo config`
//! - **Library**: launch an [`RpcBackend`] and drive it with a
//!   [`PhaseOrchestrator`], or plug in your own [`ToolBackend`]
//!
//! # Quick Start (Library)
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use initrepo_agent::{CliArgs, Config, OrchestratorSettings, PhaseOrchestrator, RpcBackend};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Path::new(".");
//! let config = Config::discover_from(root, &CliArgs::default())?;
//! let backend = Arc::new(RpcBackend::launch(&config, root).await?);
//!
//! let mut orchestrator = PhaseOrchestrator::new(backend.clone(), OrchestratorSettings::from(&config));
//! let report = orchestrator.run().await?;
//! backend.stop().await?;
//!
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Run reached Done, verification passed, status or plan produced |
//! | 1 | Run aborted, verification failed, nothing to plan, or backend failure |
//! | 2 | Invalid configuration or CLI arguments |

pub mod cli;

pub use initrepo_config::{CliArgs, Config, ConfigBuilder, ConfigSource};
pub use initrepo_engine::{
    EngineError, ExecutionOutcome, ImplementationPlan, OrchestratorSettings, PhaseData,
    PhaseOrchestrator, PhaseResult, ProjectStatus, ProjectVerification, RpcBackend, RunOutcome,
    RunReport, RunState, StepSpec, TaskExecutor, TaskVerification, ToolBackend, WorkItem,
    find_related_ids, plan_implementation, project_status, verify_project, verify_task,
};
pub use initrepo_scoring::{GateResult, GateThresholds, ScoreInputs, quality_score, verification_score};
pub use initrepo_transport::{ProcessTransport, RpcClient, RpcError, TransportConfig, TransportError};
pub use initrepo_utils::{ConfigError, ErrorCategory, ExitCode, PhaseId, UserFriendlyError};
