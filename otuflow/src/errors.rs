//! Error types for the otuflow engine.
//!
//! Stages report recoverable problems (a tool exiting nonzero, a single bad input in a
//! fan-out) through [`crate::core::StageResult`] messages. The types here cover the
//! narrow set of conditions that abort a stage outright.

use crate::core::StageIdentity;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = OtuflowError> = std::result::Result<T, E>;

/// The main error type for otuflow operations.
#[derive(Debug, Error)]
pub enum OtuflowError {
    /// A command configuration file could not be used.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A stage received fewer input files than it needs.
    #[error("{0}")]
    InputCount(#[from] WrongInputCountError),

    /// `launch` was called before any input was assigned.
    #[error("Input files are not set for stage {0}")]
    InputsNotSet(StageIdentity),

    /// `launch` was called before the orchestrator assigned an output root.
    #[error("Output folder is not set for stage {0}")]
    OutputRootNotSet(StageIdentity),

    /// An input file does not exist.
    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// The parent of the pipeline output folder does not exist.
    #[error("Cannot find output folder: {}", .0.display())]
    MissingOutputParent(PathBuf),

    /// Forward and reverse mate files could not be paired.
    #[error("Mate pairs differ in number: {forward} forward, {reverse} reverse")]
    MatePairMismatch {
        /// Number of forward files.
        forward: usize,
        /// Number of reverse files.
        reverse: usize,
    },

    /// A sequence file could not be parsed.
    #[error("Could not read sequences in {}: {message}", .path.display())]
    Sequence {
        /// The offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// An external program could not be started.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A pooled worker task panicked or was torn down.
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// Work was abandoned because cancellation was requested.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A settings file could not be deserialized.
    #[error("Invalid settings in {}: {message}", .path.display())]
    Settings {
        /// The settings file.
        path: PathBuf,
        /// Deserializer message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OtuflowError {
    /// Builds a sequence parsing error for `path`.
    pub fn sequence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Sequence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if the error only reflects a cancellation request.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Errors raised while locating or parsing a command configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Cannot find config file: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file exists but could not be read.
    #[error("Cannot read config file {}: {source}", .path.display())]
    Unreadable {
        /// The file that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A recognized directive has the wrong number of fields.
    #[error("{0}")]
    Malformed(#[from] BadDirectiveError),
}

/// A recognized directive with the wrong field count.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("line {line}: {keyword} must have {expected} fields but found {found}")]
pub struct BadDirectiveError {
    /// One-based line number.
    pub line: usize,
    /// The directive keyword (`ARG`, `VAL`, `ENV`, `CMD`).
    pub keyword: String,
    /// Expected field count, keyword included.
    pub expected: usize,
    /// Actual field count, keyword included.
    pub found: usize,
}

/// Signals that a stage received fewer input files than required.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Wrong file number: {expected} expected but {found} found")]
pub struct WrongInputCountError {
    /// Number of files expected.
    pub expected: usize,
    /// Number of files received.
    pub found: usize,
}

impl WrongInputCountError {
    /// Creates a new input count error.
    #[must_use]
    pub const fn new(expected: usize, found: usize) -> Self {
        Self { expected, found }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_input_count_message() {
        let err = WrongInputCountError::new(2, 1);
        assert_eq!(err.to_string(), "Wrong file number: 2 expected but 1 found");
    }

    #[test]
    fn test_bad_directive_message() {
        let err = BadDirectiveError {
            line: 3,
            keyword: "ARG".to_string(),
            expected: 3,
            found: 2,
        };
        assert_eq!(err.to_string(), "line 3: ARG must have 3 fields but found 2");
    }

    #[test]
    fn test_config_error_converts() {
        let err: OtuflowError = ConfigError::NotFound(PathBuf::from("/tmp/x.config")).into();
        assert!(matches!(err, OtuflowError::Config(ConfigError::NotFound(_))));
        assert!(err.to_string().contains("x.config"));
    }

    #[test]
    fn test_inputs_not_set_names_stage() {
        let err = OtuflowError::InputsNotSet(StageIdentity::Mapping);
        assert!(err.to_string().contains("Read mapping"));
    }

    #[test]
    fn test_cancellation_flag() {
        assert!(OtuflowError::Cancelled("stop".into()).is_cancellation());
        assert!(!OtuflowError::Worker("panic".into()).is_cancellation());
    }
}
