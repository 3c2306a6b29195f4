use std::collections::BTreeMap;

use crate::model::{Config, ConfigSource};

fn source_label(source: Option<&ConfigSource>) -> String {
    match source {
        Some(ConfigSource::Cli) => "cli".to_string(),
        Some(ConfigSource::ConfigFile(path)) => format!("config ({})", path.display()),
        Some(ConfigSource::Programmatic) => "programmatic".to_string(),
        Some(ConfigSource::Default) | None => "default".to_string(),
    }
}

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut out = BTreeMap::new();
        let mut add = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                let source = source_label(self.source_attribution.get(key));
                out.insert(key.to_string(), (value, source));
            }
        };

        add("backend.command", Some(self.command().to_string()));
        if !self.backend.args.is_empty() {
            add("backend.args", Some(self.backend.args.join(" ")));
        }
        add(
            "backend.server_path",
            self.backend.server_path.as_ref().map(|p| p.display().to_string()),
        );
        add(
            "backend.working_dir",
            self.backend.working_dir.as_ref().map(|p| p.display().to_string()),
        );
        add("backend.ready_sentinel", Some(self.ready_sentinel().to_string()));
        add(
            "backend.startup_timeout_secs",
            Some(self.startup_timeout().as_secs().to_string()),
        );
        add(
            "backend.call_timeout_secs",
            Some(self.call_timeout().as_secs().to_string()),
        );
        add(
            "backend.stop_grace_ms",
            Some(self.stop_grace().as_millis().to_string()),
        );
        add(
            "execution.item_pacing_ms",
            Some(self.item_pacing().as_millis().to_string()),
        );
        add("execution.max_parallel", Some(self.max_parallel().to_string()));

        let gates = self.gate_thresholds();
        add("gates.min_success_ratio", Some(gates.min_success_ratio.to_string()));
        add("gates.min_final_health", Some(gates.min_final_health.to_string()));
        add("gates.min_quality_score", Some(gates.min_quality_score.to_string()));
        add(
            "gates.min_verification_score",
            Some(gates.min_verification_score.to_string()),
        );

        out
    }
}
