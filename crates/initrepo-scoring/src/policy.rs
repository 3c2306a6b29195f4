//! Score formulas.
//!
//! Both scores are integers in `[0, 100]`, pure functions of their inputs,
//! and never increase when a penalty input grows.

use serde::{Deserialize, Serialize};

/// Measurements feeding the verification score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreInputs {
    /// Backend health score, nominally 0-100
    pub health_score: f64,
    pub doc_complete: bool,
    pub issue_count: u32,
    pub gap_count: u32,
    pub orphan_count: u32,
}

/// `max(0, 100 - 5*issues - 10*gaps - 3*orphans)`
#[must_use]
pub fn quality_score(issue_count: u32, gap_count: u32, orphan_count: u32) -> u8 {
    let penalty = 5 * i64::from(issue_count) + 10 * i64::from(gap_count) + 3 * i64::from(orphan_count);
    // 0..=100 after the clamp, so the narrowing is lossless
    (100 - penalty).clamp(0, 100) as u8
}

/// Weighted blend of health with capped penalties, rounded and clipped.
///
/// `60 + 0.4*health - min(3*issues, 15) - min(5*gaps, 15) - min(2*orphans, 10)`,
/// minus 20 when documentation is incomplete. A non-finite health score
/// counts as 0.
///
/// ```rust
/// use initrepo_scoring::{ScoreInputs, verification_score};
///
/// let inputs = ScoreInputs { health_score: 90.0, doc_complete: true, ..ScoreInputs::default() };
/// assert_eq!(verification_score(&inputs), 96);
/// ```
#[must_use]
pub fn verification_score(inputs: &ScoreInputs) -> u8 {
    let health = if inputs.health_score.is_finite() {
        inputs.health_score
    } else {
        0.0
    };
    let capped = |count: u32, weight: u64, cap: u64| (u64::from(count) * weight).min(cap) as f64;

    let mut score = 100.0 * 0.6 + health * 0.4;
    score -= capped(inputs.issue_count, 3, 15);
    score -= capped(inputs.gap_count, 5, 15);
    score -= capped(inputs.orphan_count, 2, 10);
    if !inputs.doc_complete {
        score -= 20.0;
    }

    score.clamp(0.0, 100.0).round() as u8
}
