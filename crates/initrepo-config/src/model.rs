use initrepo_scoring::GateThresholds;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Built-in defaults
pub mod defaults {
    pub const COMMAND: &str = "node";
    pub const STARTUP_TIMEOUT_SECS: u64 = 10;
    pub const CALL_TIMEOUT_SECS: u64 = 30;
    pub const STOP_GRACE_MS: u64 = 2000;
    pub const ITEM_PACING_MS: u64 = 1000;
    pub const MAX_PARALLEL: usize = 1;
    pub const READY_SENTINEL: &str = initrepo_transport::process::DEFAULT_READY_SENTINEL;
}

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Programmatic,
    Default,
}

/// `[backend]`: how the MCP server is launched and talked to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Interpreter or executable; `node` unless overridden
    pub command: Option<String>,
    /// Extra arguments placed after the server path
    #[serde(default)]
    pub args: Vec<String>,
    /// Server entry point; searched for when unset
    pub server_path: Option<PathBuf>,
    /// Working directory for the server; derived from the entry point when unset
    pub working_dir: Option<PathBuf>,
    pub ready_sentinel: Option<String>,
    pub startup_timeout_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
    pub stop_grace_ms: Option<u64>,
}

/// `[execution]`: work-item scheduling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Pause after each completed item; 0 disables
    pub item_pacing_ms: Option<u64>,
    /// Items processed concurrently; 1 is strictly sequential
    pub max_parallel: Option<usize>,
}

/// `[gates]`: phase transition thresholds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatesConfig {
    pub min_success_ratio: Option<f64>,
    pub min_final_health: Option<f64>,
    pub min_quality_score: Option<u8>,
    pub min_verification_score: Option<u8>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub execution: ExecutionConfig,
    pub gates: GatesConfig,
    /// Config file that contributed values, if any
    pub config_path: Option<PathBuf>,
    /// Source of each resolved key, keyed as `section.key`
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Overrides collected from the command line
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub backend_command: Option<String>,
    pub server_path: Option<PathBuf>,
    pub call_timeout_secs: Option<u64>,
    pub item_pacing_ms: Option<u64>,
    pub max_parallel: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        let gates = GateThresholds::default();
        Self {
            backend: BackendConfig {
                command: Some(defaults::COMMAND.to_string()),
                args: Vec::new(),
                server_path: None,
                working_dir: None,
                ready_sentinel: Some(defaults::READY_SENTINEL.to_string()),
                startup_timeout_secs: Some(defaults::STARTUP_TIMEOUT_SECS),
                call_timeout_secs: Some(defaults::CALL_TIMEOUT_SECS),
                stop_grace_ms: Some(defaults::STOP_GRACE_MS),
            },
            execution: ExecutionConfig {
                item_pacing_ms: Some(defaults::ITEM_PACING_MS),
                max_parallel: Some(defaults::MAX_PARALLEL),
            },
            gates: GatesConfig {
                min_success_ratio: Some(gates.min_success_ratio),
                min_final_health: Some(gates.min_final_health),
                min_quality_score: Some(gates.min_quality_score),
                min_verification_score: Some(gates.min_verification_score),
            },
            config_path: None,
            source_attribution: HashMap::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn command(&self) -> &str {
        self.backend.command.as_deref().unwrap_or(defaults::COMMAND)
    }

    #[must_use]
    pub fn ready_sentinel(&self) -> &str {
        self.backend
            .ready_sentinel
            .as_deref()
            .unwrap_or(defaults::READY_SENTINEL)
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(
            self.backend
                .startup_timeout_secs
                .unwrap_or(defaults::STARTUP_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(
            self.backend
                .call_timeout_secs
                .unwrap_or(defaults::CALL_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.backend.stop_grace_ms.unwrap_or(defaults::STOP_GRACE_MS))
    }

    #[must_use]
    pub fn item_pacing(&self) -> Duration {
        Duration::from_millis(
            self.execution
                .item_pacing_ms
                .unwrap_or(defaults::ITEM_PACING_MS),
        )
    }

    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.execution.max_parallel.unwrap_or(defaults::MAX_PARALLEL)
    }

    /// Gate thresholds with unset keys filled from the defaults.
    #[must_use]
    pub fn gate_thresholds(&self) -> GateThresholds {
        let base = GateThresholds::default();
        GateThresholds {
            min_success_ratio: self.gates.min_success_ratio.unwrap_or(base.min_success_ratio),
            min_final_health: self.gates.min_final_health.unwrap_or(base.min_final_health),
            min_quality_score: self.gates.min_quality_score.unwrap_or(base.min_quality_score),
            min_verification_score: self
                .gates
                .min_verification_score
                .unwrap_or(base.min_verification_score),
        }
    }
}
