//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::core::{StageIdentity, StageResult};
use crate::errors::{OtuflowError, Result};
use crate::stages::{Stage, StageState};

/// Shared record of the inputs each launch received.
#[derive(Debug, Clone, Default)]
pub struct LaunchLog {
    launches: Arc<Mutex<Vec<Vec<PathBuf>>>>,
}

impl LaunchLog {
    fn record(&self, state: &StageState) {
        let inputs = state.inputs().map(<[PathBuf]>::to_vec).unwrap_or_default();
        self.launches.lock().push(inputs);
    }

    /// Number of launches.
    #[must_use]
    pub fn count(&self) -> usize {
        self.launches.lock().len()
    }

    /// Inputs of the most recent launch.
    #[must_use]
    pub fn last_inputs(&self) -> Option<Vec<PathBuf>> {
        self.launches.lock().last().cloned()
    }
}

/// A stage that writes a fixed set of small output files and returns a scripted result.
#[derive(Debug)]
pub struct ScriptedStage {
    state: StageState,
    output_names: Vec<String>,
    result: StageResult,
    log: LaunchLog,
}

impl ScriptedStage {
    /// Creates a stage that writes `outputs` files named `<subdir>_<n>.txt`.
    #[must_use]
    pub fn new(identity: StageIdentity, outputs: usize) -> Self {
        let names = (1..=outputs)
            .map(|n| format!("{}_{n}.txt", identity.default_subdir()))
            .collect();
        Self {
            state: StageState::new(identity),
            output_names: names,
            result: StageResult::passed(),
            log: LaunchLog::default(),
        }
    }

    /// Sets the output file names.
    #[must_use]
    pub fn with_output_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the result returned by `launch`.
    #[must_use]
    pub fn with_result(mut self, result: StageResult) -> Self {
        self.result = result;
        self
    }

    /// A handle on the launch log.
    #[must_use]
    pub fn log(&self) -> LaunchLog {
        self.log.clone()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, _cancel: &CancellationToken) -> Result<StageResult> {
        self.state.require_inputs()?;
        self.log.record(&self.state);
        let dir = self.state.prepare()?;
        for name in &self.output_names {
            let path = dir.join(name);
            std::fs::write(&path, name.as_bytes())?;
            self.state.add_output(path);
        }
        Ok(self.result.clone())
    }
}

/// A stage that always fails with a fail message.
#[derive(Debug)]
pub struct FailingStage {
    state: StageState,
    message: String,
    log: LaunchLog,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(identity: StageIdentity, message: impl Into<String>) -> Self {
        Self {
            state: StageState::new(identity),
            message: message.into(),
            log: LaunchLog::default(),
        }
    }

    /// A handle on the launch log.
    #[must_use]
    pub fn log(&self) -> LaunchLog {
        self.log.clone()
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, _cancel: &CancellationToken) -> Result<StageResult> {
        self.log.record(&self.state);
        Ok(StageResult::failed(self.message.clone()))
    }
}

/// A stage whose launch returns an I/O error.
#[derive(Debug)]
pub struct ErroringStage {
    state: StageState,
}

impl ErroringStage {
    /// Creates an erroring stage.
    #[must_use]
    pub fn new(identity: StageIdentity) -> Self {
        Self {
            state: StageState::new(identity),
        }
    }
}

#[async_trait]
impl Stage for ErroringStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, _cancel: &CancellationToken) -> Result<StageResult> {
        Err(OtuflowError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk went away",
        )))
    }
}

/// A stage that sleeps, returning early as interrupted when its token fires.
#[derive(Debug)]
pub struct SlowStage {
    state: StageState,
    duration: Duration,
    honour_cancel: bool,
    observed_cancel: Arc<AtomicBool>,
}

impl SlowStage {
    /// Creates a stage that takes `duration` to pass.
    #[must_use]
    pub fn new(identity: StageIdentity, duration: Duration) -> Self {
        Self {
            state: StageState::new(identity),
            duration,
            honour_cancel: true,
            observed_cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes the stage ignore cancellation entirely.
    #[must_use]
    pub fn ignoring_cancel(mut self) -> Self {
        self.honour_cancel = false;
        self
    }

    /// Returns true if a launch returned early because of cancellation.
    #[must_use]
    pub fn observed_cancel(&self) -> bool {
        self.observed_cancel.load(Ordering::SeqCst)
    }

    /// A shared handle on the cancellation flag.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.observed_cancel)
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, cancel: &CancellationToken) -> Result<StageResult> {
        if !self.honour_cancel {
            tokio::time::sleep(self.duration).await;
            return Ok(StageResult::passed());
        }
        tokio::select! {
            () = tokio::time::sleep(self.duration) => Ok(StageResult::passed()),
            () = cancel.cancelled() => {
                self.observed_cancel.store(true, Ordering::SeqCst);
                Ok(StageResult::interrupted())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_scripted_stage_writes_outputs_and_logs_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = ScriptedStage::new(StageIdentity::Pooling, 0).with_output_names(["x.txt", "y.txt"]);
        let log = stage.log();
        stage.set_output_root(dir.path());
        stage.set_input_files(vec![PathBuf::from("seed.txt")]);

        let result = stage.launch(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::Passed);
        assert_eq!(stage.output_files().len(), 2);
        assert!(stage.output_files()[0].ends_with("pooled/x.txt"));
        assert_eq!(log.count(), 1);
        assert_eq!(log.last_inputs(), Some(vec![PathBuf::from("seed.txt")]));
    }

    #[tokio::test]
    async fn test_scripted_stage_requires_inputs() {
        let mut stage = ScriptedStage::new(StageIdentity::Pooling, 1);
        let err = stage.launch(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OtuflowError::InputsNotSet(StageIdentity::Pooling)));
    }

    #[tokio::test]
    async fn test_slow_stage_honours_cancel() {
        let mut stage = SlowStage::new(StageIdentity::Mapping, Duration::from_secs(30));
        let token = CancellationToken::new();
        token.cancel("now");
        let result = stage.launch(&token).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::Interrupted);
        assert!(stage.observed_cancel());
    }
}
