//! Phase gates.
//!
//! Every gate records one [`GateCondition`] per threshold it checks, so an
//! abort reason can name every failing condition rather than the first.

use serde::{Deserialize, Serialize};

/// Result of a gate evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub summary: String,
    pub conditions: Vec<GateCondition>,
    pub failure_reasons: Vec<String>,
}

impl GateResult {
    /// Failure reasons joined for display, or the summary when none failed.
    #[must_use]
    pub fn reason(&self) -> String {
        if self.failure_reasons.is_empty() {
            self.summary.clone()
        } else {
            self.failure_reasons.join("; ")
        }
    }
}

/// One threshold check within a gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCondition {
    pub name: String,
    pub description: String,
    pub passed: bool,
    pub actual: Option<String>,
    pub expected: Option<String>,
}

/// Thresholds for the implementation, quality-assurance and verification gates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Minimum completed/total ratio of work items
    pub min_success_ratio: f64,
    /// Minimum health score reported after quality assurance
    pub min_final_health: f64,
    pub min_quality_score: u8,
    pub min_verification_score: u8,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_success_ratio: 0.80,
            min_final_health: 85.0,
            min_quality_score: 80,
            min_verification_score: 80,
        }
    }
}

#[derive(Default)]
struct Evaluation {
    conditions: Vec<GateCondition>,
    failure_reasons: Vec<String>,
}

impl Evaluation {
    fn check(&mut self, name: &str, description: &str, passed: bool, actual: String, expected: String) {
        if !passed {
            self.failure_reasons
                .push(format!("{name} {actual} is below the required {expected}"));
        }
        self.conditions.push(GateCondition {
            name: name.to_string(),
            description: description.to_string(),
            passed,
            actual: Some(actual),
            expected: Some(format!(">= {expected}")),
        });
    }

    fn finish(self, gate: &str) -> GateResult {
        let passed = self.failure_reasons.is_empty();
        let summary = if passed {
            format!("{gate} gate passed")
        } else {
            format!("{gate} gate failed")
        };
        GateResult {
            passed,
            summary,
            conditions: self.conditions,
            failure_reasons: self.failure_reasons,
        }
    }

    fn ratio(&mut self, min: f64, ratio: f64) {
        self.check(
            "success ratio",
            "Share of work items that completed every step",
            ratio >= min,
            format!("{ratio:.2}"),
            format!("{min:.2}"),
        );
    }
}

impl GateThresholds {
    /// Implementation -> QualityAssurance
    #[must_use]
    pub fn implementation(&self, success_ratio: f64) -> GateResult {
        let mut eval = Evaluation::default();
        eval.ratio(self.min_success_ratio, success_ratio);
        eval.finish("implementation")
    }

    /// QualityAssurance -> Done
    #[must_use]
    pub fn quality_assurance(&self, final_health: f64, quality: u8, success_ratio: f64) -> GateResult {
        let mut eval = Evaluation::default();
        eval.check(
            "final health",
            "Backend health score after quality checks",
            final_health >= self.min_final_health,
            format!("{final_health}"),
            format!("{}", self.min_final_health),
        );
        eval.check(
            "quality score",
            "Penalty score over cross-reference issues, documentation gaps and orphans",
            quality >= self.min_quality_score,
            quality.to_string(),
            self.min_quality_score.to_string(),
        );
        eval.ratio(self.min_success_ratio, success_ratio);
        eval.finish("quality assurance")
    }

    /// Project verification
    #[must_use]
    pub fn verification(&self, score: u8) -> GateResult {
        let mut eval = Evaluation::default();
        eval.check(
            "verification score",
            "Blended health, documentation and reference score",
            score >= self.min_verification_score,
            score.to_string(),
            self.min_verification_score.to_string(),
        );
        eval.finish("verification")
    }
}
