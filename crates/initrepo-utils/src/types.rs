//! Identifiers shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four working phases of an autonomous run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseId {
    Discovery,
    Planning,
    Implementation,
    QualityAssurance,
}

impl PhaseId {
    /// All phases in execution order.
    pub const ALL: [PhaseId; 4] = [
        PhaseId::Discovery,
        PhaseId::Planning,
        PhaseId::Implementation,
        PhaseId::QualityAssurance,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PhaseId::Discovery => "discovery",
            PhaseId::Planning => "planning",
            PhaseId::Implementation => "implementation",
            PhaseId::QualityAssurance => "quality_assurance",
        }
    }

    /// The phase that follows this one, or `None` after QualityAssurance.
    #[must_use]
    pub const fn next(self) -> Option<PhaseId> {
        match self {
            PhaseId::Discovery => Some(PhaseId::Planning),
            PhaseId::Planning => Some(PhaseId::Implementation),
            PhaseId::Implementation => Some(PhaseId::QualityAssurance),
            PhaseId::QualityAssurance => None,
        }
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
