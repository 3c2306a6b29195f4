use initrepo_utils::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::{BackendConfig, CliArgs, Config, ConfigSource, ExecutionConfig, GatesConfig};

pub(crate) const CONFIG_DIR: &str = ".initrepo";
pub(crate) const CONFIG_FILE: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    backend: Option<BackendConfig>,
    execution: Option<ExecutionConfig>,
    gates: Option<GatesConfig>,
}

/// Keys that carry a built-in default
const DEFAULTED_KEYS: &[&str] = &[
    "backend.command",
    "backend.ready_sentinel",
    "backend.startup_timeout_secs",
    "backend.call_timeout_secs",
    "backend.stop_grace_ms",
    "execution.item_pacing_ms",
    "execution.max_parallel",
    "gates.min_success_ratio",
    "gates.min_final_health",
    "gates.min_quality_score",
    "gates.min_verification_score",
];

/// Overwrite `slot` when `value` is set and record where it came from.
fn apply<T>(
    slot: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if let Some(value) = value {
        *slot = Some(value);
        attribution.insert(key.to_string(), source.clone());
    }
}

impl Config {
    /// Discover and load configuration starting from the current directory.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| ConfigError::InvalidFile {
            path: ".".to_string(),
            reason: format!("cannot read current directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from `start_dir`.
    ///
    /// An explicit `--config` path must exist. Otherwise the nearest
    /// `.initrepo/config.toml` up to the repository root is used, then the
    /// user-level file, then built-in defaults. The result is validated.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        for key in DEFAULTED_KEYS {
            config
                .source_attribution
                .insert((*key).to_string(), ConfigSource::Default);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) if !explicit.is_file() => {
                return Err(ConfigError::NotFound {
                    path: explicit.display().to_string(),
                });
            }
            Some(explicit) => Some(explicit.clone()),
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            debug!(path = %path.display(), "Loading config file");
            let file = load_config_file(path)?;
            config.merge_file(file, ConfigSource::ConfigFile(path.clone()));
            config.config_path = Some(path.clone());
        }

        config.apply_cli(cli_args);
        config.validate()?;
        Ok(config)
    }

    /// Nearest `.initrepo/config.toml` walking up from `start_dir`, stopping at
    /// a repository root, then `<user config dir>/initrepo/config.toml`.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);
        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() {
                break;
            }
            current = dir.parent();
        }

        dirs::config_dir()
            .map(|dir| dir.join("initrepo").join(CONFIG_FILE))
            .filter(|path| path.is_file())
    }

    fn merge_file(&mut self, file: TomlConfig, source: ConfigSource) {
        let attr = &mut self.source_attribution;

        if let Some(backend) = file.backend {
            let b = &mut self.backend;
            apply(&mut b.command, backend.command, "backend.command", &source, attr);
            apply(&mut b.server_path, backend.server_path, "backend.server_path", &source, attr);
            apply(&mut b.working_dir, backend.working_dir, "backend.working_dir", &source, attr);
            apply(&mut b.ready_sentinel, backend.ready_sentinel, "backend.ready_sentinel", &source, attr);
            apply(
                &mut b.startup_timeout_secs,
                backend.startup_timeout_secs,
                "backend.startup_timeout_secs",
                &source,
                attr,
            );
            apply(
                &mut b.call_timeout_secs,
                backend.call_timeout_secs,
                "backend.call_timeout_secs",
                &source,
                attr,
            );
            apply(&mut b.stop_grace_ms, backend.stop_grace_ms, "backend.stop_grace_ms", &source, attr);
            if !backend.args.is_empty() {
                b.args = backend.args;
                attr.insert("backend.args".to_string(), source.clone());
            }
        }

        if let Some(execution) = file.execution {
            let e = &mut self.execution;
            apply(&mut e.item_pacing_ms, execution.item_pacing_ms, "execution.item_pacing_ms", &source, attr);
            apply(&mut e.max_parallel, execution.max_parallel, "execution.max_parallel", &source, attr);
        }

        if let Some(gates) = file.gates {
            let g = &mut self.gates;
            apply(&mut g.min_success_ratio, gates.min_success_ratio, "gates.min_success_ratio", &source, attr);
            apply(&mut g.min_final_health, gates.min_final_health, "gates.min_final_health", &source, attr);
            apply(&mut g.min_quality_score, gates.min_quality_score, "gates.min_quality_score", &source, attr);
            apply(
                &mut g.min_verification_score,
                gates.min_verification_score,
                "gates.min_verification_score",
                &source,
                attr,
            );
        }
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        let source = ConfigSource::Cli;
        let attr = &mut self.source_attribution;
        apply(&mut self.backend.command, cli.backend_command.clone(), "backend.command", &source, attr);
        apply(&mut self.backend.server_path, cli.server_path.clone(), "backend.server_path", &source, attr);
        apply(
            &mut self.backend.call_timeout_secs,
            cli.call_timeout_secs,
            "backend.call_timeout_secs",
            &source,
            attr,
        );
        apply(
            &mut self.execution.item_pacing_ms,
            cli.item_pacing_ms,
            "execution.item_pacing_ms",
            &source,
            attr,
        );
        apply(&mut self.execution.max_parallel, cli.max_parallel, "execution.max_parallel", &source, attr);
    }
}

fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidFile {
        path: path.display().to_string(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    toml::from_str(&content).map_err(|e| invalid(e.to_string()))
}
