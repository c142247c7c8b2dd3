//! Structured stage results.

use super::StageOutcome;
use serde::Serialize;
use std::fmt;

/// An insertion-ordered set of messages that collapses duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MessageSet(Vec<String>);

impl MessageSet {
    /// Inserts a message, returning false if it was already present.
    pub fn insert(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        if self.0.contains(&message) {
            return false;
        }
        self.0.push(message);
        true
    }

    /// Number of distinct messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no message was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the messages in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns true if `message` was recorded.
    #[must_use]
    pub fn contains(&self, message: &str) -> bool {
        self.0.iter().any(|m| m == message)
    }
}

/// The result of one stage launch.
///
/// Passed and failed outcomes are mutually exclusive. Adding a warning upgrades the
/// outcome to its `*WithWarnings` form; adding a fail message moves a passed outcome
/// to the matching failed one. An interrupted result ignores messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
    outcome: StageOutcome,
    warnings: MessageSet,
    fails: MessageSet,
}

impl StageResult {
    /// A clean successful result.
    #[must_use]
    pub fn passed() -> Self {
        Self {
            outcome: StageOutcome::Passed,
            warnings: MessageSet::default(),
            fails: MessageSet::default(),
        }
    }

    /// A failed result carrying one fail message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        let mut result = Self::passed();
        result.add_fail(message);
        result
    }

    /// An interrupted result.
    #[must_use]
    pub fn interrupted() -> Self {
        Self {
            outcome: StageOutcome::Interrupted,
            warnings: MessageSet::default(),
            fails: MessageSet::default(),
        }
    }

    /// Records a warning.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.outcome = match self.outcome {
            StageOutcome::Interrupted => return,
            StageOutcome::Passed | StageOutcome::PassedWithWarnings => {
                StageOutcome::PassedWithWarnings
            }
            StageOutcome::Failed | StageOutcome::FailedWithWarnings => {
                StageOutcome::FailedWithWarnings
            }
        };
        self.warnings.insert(message);
    }

    /// Records a fail message, turning a passed result into a failed one.
    pub fn add_fail(&mut self, message: impl Into<String>) {
        self.outcome = match self.outcome {
            StageOutcome::Interrupted => return,
            StageOutcome::Passed | StageOutcome::Failed => StageOutcome::Failed,
            StageOutcome::PassedWithWarnings | StageOutcome::FailedWithWarnings => {
                StageOutcome::FailedWithWarnings
            }
        };
        self.fails.insert(message);
    }

    /// Builder form of [`add_warning`](Self::add_warning).
    #[must_use]
    pub fn with_warning(mut self, message: impl Into<String>) -> Self {
        self.add_warning(message);
        self
    }

    /// The outcome.
    #[must_use]
    pub const fn outcome(&self) -> StageOutcome {
        self.outcome
    }

    /// Recorded warnings.
    #[must_use]
    pub const fn warnings(&self) -> &MessageSet {
        &self.warnings
    }

    /// Recorded fail messages.
    #[must_use]
    pub const fn fails(&self) -> &MessageSet {
        &self.fails
    }

    /// Returns true if the pipeline may advance.
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        self.outcome.is_passed()
    }
}

impl Default for StageResult {
    fn default() -> Self {
        Self::passed()
    }
}

impl fmt::Display for StageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outcome)?;
        for warning in self.warnings.iter() {
            write!(f, "\n  warning: {warning}")?;
        }
        for fail in self.fails.iter() {
            write!(f, "\n  fail: {fail}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_warning_upgrades_passed() {
        let mut result = StageResult::passed();
        result.add_warning("low coverage");
        assert_eq!(result.outcome(), StageOutcome::PassedWithWarnings);
    }

    #[test]
    fn test_fail_moves_to_failed_with_warnings() {
        let mut result = StageResult::passed().with_warning("w");
        result.add_fail("boom");
        assert_eq!(result.outcome(), StageOutcome::FailedWithWarnings);
        assert!(result.fails().contains("boom"));
    }

    #[test]
    fn test_warning_after_fail() {
        let mut result = StageResult::failed("boom");
        assert_eq!(result.outcome(), StageOutcome::Failed);
        result.add_warning("w");
        assert_eq!(result.outcome(), StageOutcome::FailedWithWarnings);
    }

    #[test]
    fn test_messages_deduplicate_in_order() {
        let mut result = StageResult::passed();
        result.add_warning("b");
        result.add_warning("a");
        result.add_warning("b");
        let warnings: Vec<_> = result.warnings().iter().collect();
        assert_eq!(warnings, vec!["b", "a"]);
    }

    #[test]
    fn test_interrupted_ignores_messages() {
        let mut result = StageResult::interrupted();
        result.add_warning("w");
        result.add_fail("f");
        assert_eq!(result.outcome(), StageOutcome::Interrupted);
        assert!(result.warnings().is_empty());
        assert!(result.fails().is_empty());
    }

    #[test]
    fn test_result_serializes_messages() {
        let result = StageResult::failed("tool exited with 1");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "FAILED");
        assert_eq!(json["fails"][0], "tool exited with 1");
    }

    #[test]
    fn test_display_lists_messages() {
        let result = StageResult::failed("x").with_warning("y");
        let text = result.to_string();
        assert!(text.starts_with("FAILED_WITH_WARNINGS"));
        assert!(text.contains("warning: y"));
        assert!(text.contains("fail: x"));
    }
}
