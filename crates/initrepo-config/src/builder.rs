use initrepo_scoring::GateThresholds;
use initrepo_utils::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::{Config, ConfigSource};

/// Programmatic construction of a [`Config`] without touching the filesystem.
///
/// ```rust
/// use initrepo_config::ConfigBuilder;
/// use std::time::Duration;
///
/// let config = ConfigBuilder::new()
///     .call_timeout(Duration::from_secs(5))
///     .item_pacing(Duration::ZERO)
///     .build()
///     .unwrap();
/// assert_eq!(config.call_timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl Config {
    /// Start building a config from the built-in defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    fn mark(&mut self, key: &str) {
        self.config
            .source_attribution
            .insert(key.to_string(), ConfigSource::Programmatic);
    }

    #[must_use]
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.config.backend.command = Some(command.into());
        self.mark("backend.command");
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.backend.args = args.into_iter().map(Into::into).collect();
        self.mark("backend.args");
        self
    }

    #[must_use]
    pub fn server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend.server_path = Some(path.into());
        self.mark("backend.server_path");
        self
    }

    #[must_use]
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend.working_dir = Some(path.into());
        self.mark("backend.working_dir");
        self
    }

    #[must_use]
    pub fn ready_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.config.backend.ready_sentinel = Some(sentinel.into());
        self.mark("backend.ready_sentinel");
        self
    }

    #[must_use]
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.config.backend.startup_timeout_secs = Some(timeout.as_secs());
        self.mark("backend.startup_timeout_secs");
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.backend.call_timeout_secs = Some(timeout.as_secs());
        self.mark("backend.call_timeout_secs");
        self
    }

    #[must_use]
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.config.backend.stop_grace_ms = Some(u64::try_from(grace.as_millis()).unwrap_or(u64::MAX));
        self.mark("backend.stop_grace_ms");
        self
    }

    #[must_use]
    pub fn item_pacing(mut self, pacing: Duration) -> Self {
        self.config.execution.item_pacing_ms = Some(u64::try_from(pacing.as_millis()).unwrap_or(u64::MAX));
        self.mark("execution.item_pacing_ms");
        self
    }

    #[must_use]
    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.config.execution.max_parallel = Some(max_parallel);
        self.mark("execution.max_parallel");
        self
    }

    #[must_use]
    pub fn gate_thresholds(mut self, gates: GateThresholds) -> Self {
        self.config.gates.min_success_ratio = Some(gates.min_success_ratio);
        self.config.gates.min_final_health = Some(gates.min_final_health);
        self.config.gates.min_quality_score = Some(gates.min_quality_score);
        self.config.gates.min_verification_score = Some(gates.min_verification_score);
        for key in [
            "gates.min_success_ratio",
            "gates.min_final_health",
            "gates.min_quality_score",
            "gates.min_verification_score",
        ] {
            self.mark(key);
        }
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_marks_programmatic_sources() {
        let config = ConfigBuilder::new().max_parallel(3).build().unwrap();
        assert_eq!(config.max_parallel(), 3);
        assert_eq!(
            config.source_attribution.get("execution.max_parallel"),
            Some(&ConfigSource::Programmatic)
        );
    }

    #[test]
    fn test_builder_validates() {
        let err = ConfigBuilder::new()
            .startup_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
