//! Per-stage bookkeeping shared by every concrete stage.

use crate::core::StageIdentity;
use crate::errors::{OtuflowError, Result, WrongInputCountError};
use std::path::{Path, PathBuf};

/// Inputs, outputs, and output-directory contract of one stage.
///
/// The output directory is `root/[ordinal.]subdir`. Outputs are append-only during
/// `launch` and cleared by [`prepare`](Self::prepare) at the start of the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageState {
    identity: StageIdentity,
    inputs: Option<Vec<PathBuf>>,
    outputs: Vec<PathBuf>,
    output_root: Option<PathBuf>,
    subdir: String,
    ordinal: Option<usize>,
}

impl StageState {
    /// Creates state for `identity` using its default subdirectory.
    #[must_use]
    pub fn new(identity: StageIdentity) -> Self {
        Self {
            identity,
            inputs: None,
            outputs: Vec::new(),
            output_root: None,
            subdir: identity.default_subdir().to_string(),
            ordinal: None,
        }
    }

    /// Overrides the subdirectory name.
    #[must_use]
    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = subdir.into();
        self
    }

    /// The stage identity.
    #[must_use]
    pub const fn identity(&self) -> StageIdentity {
        self.identity
    }

    /// Records the input files. Existence is not checked here.
    pub fn set_inputs(&mut self, inputs: Vec<PathBuf>) {
        self.inputs = Some(inputs);
    }

    /// The input files, if set.
    #[must_use]
    pub fn inputs(&self) -> Option<&[PathBuf]> {
        self.inputs.as_deref()
    }

    /// Sets the shared output root.
    pub fn set_output_root(&mut self, root: impl Into<PathBuf>) {
        self.output_root = Some(root.into());
    }

    /// The shared output root, if set.
    #[must_use]
    pub fn output_root(&self) -> Option<&Path> {
        self.output_root.as_deref()
    }

    /// Sets the ordinal prefixed to the subdirectory name.
    pub fn set_ordinal(&mut self, ordinal: Option<usize>) {
        self.ordinal = ordinal;
    }

    /// The ordinal, if any.
    #[must_use]
    pub const fn ordinal(&self) -> Option<usize> {
        self.ordinal
    }

    /// The stage's own output directory.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        let name = match self.ordinal {
            Some(n) => format!("{n}.{}", self.subdir),
            None => self.subdir.clone(),
        };
        self.output_root.clone().unwrap_or_default().join(name)
    }

    /// Clears outputs from a previous launch and creates the output directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no output root is set or the directory cannot be created.
    pub fn prepare(&mut self) -> Result<PathBuf> {
        if self.output_root.is_none() {
            return Err(OtuflowError::OutputRootNotSet(self.identity));
        }
        self.outputs.clear();
        let dir = self.output_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Appends an output file.
    pub fn add_output(&mut self, path: impl Into<PathBuf>) {
        self.outputs.push(path.into());
    }

    /// Output files in the order they were produced.
    #[must_use]
    pub fn outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    /// Returns the first `expected` inputs.
    ///
    /// Too few inputs is an error. Too many is tolerated: the extra files are ignored
    /// and a warning message is returned alongside the prefix.
    ///
    /// # Errors
    ///
    /// Returns [`OtuflowError::InputsNotSet`] or [`WrongInputCountError`].
    pub fn expect_inputs(&self, expected: usize) -> Result<(Vec<PathBuf>, Option<String>)> {
        let inputs = self.require_inputs()?;
        if inputs.len() < expected {
            return Err(WrongInputCountError::new(expected, inputs.len()).into());
        }
        let warning = (inputs.len() > expected).then(|| {
            format!(
                "{} expected {expected} input files but received {}; extra files were ignored",
                self.identity,
                inputs.len()
            )
        });
        Ok((inputs[..expected].to_vec(), warning))
    }

    /// Returns all inputs, failing if none were set.
    ///
    /// # Errors
    ///
    /// Returns [`OtuflowError::InputsNotSet`].
    pub fn require_inputs(&self) -> Result<&[PathBuf]> {
        self.inputs()
            .ok_or(OtuflowError::InputsNotSet(self.identity))
    }

    /// Fails on the first input that is not an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`OtuflowError::MissingInput`].
    pub fn check_inputs_exist(&self) -> Result<()> {
        for input in self.require_inputs()? {
            if !input.is_file() {
                return Err(OtuflowError::MissingInput(input.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_output_dir_with_ordinal() {
        let mut state = StageState::new(StageIdentity::Pooling);
        state.set_output_root("/out");
        assert_eq!(state.output_dir(), PathBuf::from("/out/pooled"));
        state.set_ordinal(Some(2));
        assert_eq!(state.output_dir(), PathBuf::from("/out/2.pooled"));
    }

    #[test]
    fn test_prepare_requires_root_and_clears_outputs() {
        let mut state = StageState::new(StageIdentity::Mapping);
        assert!(matches!(state.prepare(), Err(OtuflowError::OutputRootNotSet(_))));

        let dir = tempfile::tempdir().unwrap();
        state.set_output_root(dir.path());
        state.add_output("stale");
        let out = state.prepare().unwrap();
        assert!(out.is_dir());
        assert!(state.outputs().is_empty());
        // idempotent
        state.prepare().unwrap();
    }

    #[test]
    fn test_expect_inputs_cardinality() {
        let mut state = StageState::new(StageIdentity::OtuClustering);
        assert!(matches!(
            state.expect_inputs(2),
            Err(OtuflowError::InputsNotSet(StageIdentity::OtuClustering))
        ));

        state.set_inputs(vec![PathBuf::from("a")]);
        let err = state.expect_inputs(2).unwrap_err();
        assert!(matches!(
            err,
            OtuflowError::InputCount(WrongInputCountError { expected: 2, found: 1 })
        ));

        state.set_inputs(vec!["a".into(), "b".into(), "c".into()]);
        let (used, warning) = state.expect_inputs(2).unwrap();
        assert_eq!(used, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(warning.unwrap().contains("received 3"));

        state.set_inputs(vec!["a".into(), "b".into()]);
        assert!(state.expect_inputs(2).unwrap().1.is_none());
    }

    #[test]
    fn test_check_inputs_exist() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.fasta");
        std::fs::write(&present, ">a\nA\n").unwrap();

        let mut state = StageState::new(StageIdentity::Dereplication);
        state.set_inputs(vec![present.clone()]);
        state.check_inputs_exist().unwrap();

        let missing = dir.path().join("missing.fasta");
        state.set_inputs(vec![present, missing.clone()]);
        assert!(matches!(
            state.check_inputs_exist(),
            Err(OtuflowError::MissingInput(p)) if p == missing
        ));
    }
}
