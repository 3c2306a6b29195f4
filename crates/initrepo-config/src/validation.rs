use initrepo_utils::ConfigError;

use crate::model::Config;

impl Config {
    /// Check every resolved value against its allowed range.
    ///
    /// A single problem is reported as [`ConfigError::InvalidValue`]; several
    /// are collected into [`ConfigError::ValidationFailed`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems: Vec<(String, String)> = Vec::new();
        let mut check = |ok: bool, key: &str, value: String| {
            if !ok {
                problems.push((key.to_string(), value));
            }
        };

        let command = self.command();
        check(!command.trim().is_empty(), "backend.command", format!("{command:?}"));

        let sentinel = self.ready_sentinel();
        check(!sentinel.is_empty(), "backend.ready_sentinel", format!("{sentinel:?}"));

        let startup = self.startup_timeout().as_secs();
        check(
            (1..=300).contains(&startup),
            "backend.startup_timeout_secs",
            format!("{startup} (must be 1-300)"),
        );

        let call = self.call_timeout().as_secs();
        check(
            (1..=3600).contains(&call),
            "backend.call_timeout_secs",
            format!("{call} (must be 1-3600)"),
        );

        let grace = self.stop_grace().as_millis();
        check(
            grace <= 60_000,
            "backend.stop_grace_ms",
            format!("{grace} (must be at most 60000)"),
        );

        let parallel = self.max_parallel();
        check(
            (1..=16).contains(&parallel),
            "execution.max_parallel",
            format!("{parallel} (must be 1-16)"),
        );

        let gates = self.gate_thresholds();
        check(
            (0.0..=1.0).contains(&gates.min_success_ratio),
            "gates.min_success_ratio",
            format!("{} (must be 0.0-1.0)", gates.min_success_ratio),
        );
        check(
            (0.0..=100.0).contains(&gates.min_final_health),
            "gates.min_final_health",
            format!("{} (must be 0-100)", gates.min_final_health),
        );
        check(
            gates.min_quality_score <= 100,
            "gates.min_quality_score",
            format!("{} (must be 0-100)", gates.min_quality_score),
        );
        check(
            gates.min_verification_score <= 100,
            "gates.min_verification_score",
            format!("{} (must be 0-100)", gates.min_verification_score),
        );

        match problems.len() {
            0 => Ok(()),
            1 => {
                let (key, value) = problems.remove(0);
                Err(ConfigError::InvalidValue { key, value })
            }
            n => Err(ConfigError::ValidationFailed {
                errors: problems
                    .into_iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect(),
                error_count: n,
            }),
        }
    }
}
