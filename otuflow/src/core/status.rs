//! Stage outcome enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage launch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageOutcome {
    /// Stage completed successfully.
    Passed,
    /// Stage completed but recorded warnings.
    PassedWithWarnings,
    /// Stage failed.
    Failed,
    /// Stage failed and also recorded warnings.
    FailedWithWarnings,
    /// Stage was stopped before it finished.
    Interrupted,
}

impl Default for StageOutcome {
    fn default() -> Self {
        Self::Passed
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::PassedWithWarnings => write!(f, "PASSED_WITH_WARNINGS"),
            Self::Failed => write!(f, "FAILED"),
            Self::FailedWithWarnings => write!(f, "FAILED_WITH_WARNINGS"),
            Self::Interrupted => write!(f, "INTERRUPTED"),
        }
    }
}

impl StageOutcome {
    /// Returns true if the pipeline may advance past this outcome.
    #[must_use]
    pub const fn is_passed(self) -> bool {
        matches!(self, Self::Passed | Self::PassedWithWarnings)
    }

    /// Returns true for the two failure outcomes.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::FailedWithWarnings)
    }

    /// Returns true if the orchestrator must stop after this outcome.
    #[must_use]
    pub const fn halts_pipeline(self) -> bool {
        !self.is_passed()
    }

    /// Returns true if the outcome carries warnings.
    #[must_use]
    pub const fn has_warnings(self) -> bool {
        matches!(self, Self::PassedWithWarnings | Self::FailedWithWarnings)
    }
}
