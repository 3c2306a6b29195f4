//! Scoring policy and phase gates.
//!
//! [`policy`] holds the pure score formulas; [`gate`] turns scores and
//! ratios into pass/fail decisions with one recorded condition per check.

pub mod gate;
pub mod policy;

pub use gate::{GateCondition, GateResult, GateThresholds};
pub use policy::{ScoreInputs, quality_score, verification_score};
