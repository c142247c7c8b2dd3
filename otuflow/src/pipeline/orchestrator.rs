//! Sequential stage orchestrator.

use crate::cancellation::CancellationToken;
use crate::config::MonitorSettings;
use crate::core::{StageIdentity, StageOutcome, StageResult};
use crate::errors::{OtuflowError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::stages::{MonitoredStage, Stage};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Folder created under the output parent to hold every stage directory.
pub const OUTPUT_FOLDER: &str = "otuflow_output";

/// Where a pipeline run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// `run` has not been called.
    NotStarted,
    /// The stage at this queue index is running.
    Running(usize),
    /// Every stage passed.
    Completed,
    /// A stage failed, errored, or was interrupted.
    Halted,
}

/// What happened to one stage during a run.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    /// The stage identity.
    pub identity: StageIdentity,
    /// The stage result, absent if `launch` returned an error.
    pub result: Option<StageResult>,
    /// Error text when `launch` returned an error.
    pub error: Option<String>,
    /// Files the stage produced.
    pub outputs: Vec<PathBuf>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage returned.
    pub finished_at: DateTime<Utc>,
}

impl StageReport {
    /// The stage outcome, or `None` for a stage that raised an error.
    #[must_use]
    pub fn outcome(&self) -> Option<StageOutcome> {
        self.result.as_ref().map(StageResult::outcome)
    }
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Run identifier shared by every event of the run.
    pub run_id: Uuid,
    /// Final state, either `Completed` or `Halted`.
    pub state: PipelineState,
    /// One entry per launched stage, in queue order.
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    /// Returns true if every stage passed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == PipelineState::Completed
    }

    /// The stage that stopped the run, if any.
    #[must_use]
    pub fn halted_at(&self) -> Option<&StageReport> {
        if self.state == PipelineState::Halted {
            self.stages.last()
        } else {
            None
        }
    }

    /// Outputs of the last stage that ran.
    #[must_use]
    pub fn final_outputs(&self) -> &[PathBuf] {
        self.stages.last().map_or(&[][..], |s| s.outputs.as_slice())
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stage in &self.stages {
            match (&stage.result, &stage.error) {
                (Some(result), _) => writeln!(f, "{}: {}", stage.identity, result.outcome())?,
                (None, Some(error)) => writeln!(f, "{}: ERROR ({error})", stage.identity)?,
                (None, None) => writeln!(f, "{}: no result", stage.identity)?,
            }
        }
        match self.state {
            PipelineState::Completed => write!(f, "Pipeline completed"),
            _ => write!(f, "Pipeline halted"),
        }
    }
}

/// An ordered queue of stages sharing one output root.
///
/// Stages are unique by identity: adding a stage whose identity is already queued
/// replaces it in place. `run` launches each stage behind a [`MonitoredStage`], feeds
/// each stage's outputs to the next stage as inputs, and stops at the first stage that
/// does not pass.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    initial_inputs: Option<Vec<PathBuf>>,
    output_root: Option<PathBuf>,
    interrupt: Arc<CancellationToken>,
    sink: Arc<dyn EventSink>,
    monitor: MonitorSettings,
    state: PipelineState,
    run_id: Uuid,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.identities())
            .field("output_root", &self.output_root)
            .field("state", &self.state)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates an empty pipeline without an output root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            initial_inputs: None,
            output_root: None,
            interrupt: Arc::new(CancellationToken::new()),
            sink: Arc::new(NoOpEventSink),
            monitor: MonitorSettings::default(),
            state: PipelineState::NotStarted,
            run_id: Uuid::new_v4(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the monitor settings used for every stage.
    #[must_use]
    pub fn with_monitor(mut self, monitor: MonitorSettings) -> Self {
        self.monitor = monitor;
        self
    }

    /// Creates (or reuses) `parent/otuflow_output` and makes it the output root of
    /// every queued and future stage.
    ///
    /// # Errors
    ///
    /// Returns [`OtuflowError::MissingOutputParent`] if `parent` is not a directory,
    /// or an I/O error if the output folder cannot be created.
    pub fn set_output_parent(&mut self, parent: &Path) -> Result<PathBuf> {
        if !parent.is_dir() {
            return Err(OtuflowError::MissingOutputParent(parent.to_path_buf()));
        }
        let root = parent.join(OUTPUT_FOLDER);
        std::fs::create_dir_all(&root)?;
        for stage in &mut self.stages {
            stage.set_output_root(&root);
        }
        info!(root = %root.display(), "Output folder ready");
        self.output_root = Some(root.clone());
        Ok(root)
    }

    /// The shared output root, once set.
    #[must_use]
    pub fn output_root(&self) -> Option<&Path> {
        self.output_root.as_deref()
    }

    /// Sets the inputs of the first stage.
    pub fn set_initial_inputs(&mut self, inputs: Vec<PathBuf>) {
        self.initial_inputs = Some(inputs);
    }

    /// Queues a stage, replacing any stage with the same identity in place.
    pub fn add_stage(&mut self, mut stage: Box<dyn Stage>) {
        if let Some(root) = &self.output_root {
            stage.set_output_root(root);
        }
        let identity = stage.identity();
        match self.position(identity) {
            Some(index) => {
                info!(stage = %identity, "Replacing queued stage");
                self.stages[index] = stage;
            }
            None => self.stages.push(stage),
        }
        self.renumber();
    }

    /// Removes and returns the stage with `identity`.
    pub fn remove_stage(&mut self, identity: StageIdentity) -> Option<Box<dyn Stage>> {
        let index = self.position(identity)?;
        let stage = self.stages.remove(index);
        self.renumber();
        Some(stage)
    }

    /// The queued stage with `identity`.
    #[must_use]
    pub fn stage(&self, identity: StageIdentity) -> Option<&dyn Stage> {
        self.position(identity).map(|index| self.stages[index].as_ref())
    }

    /// Number of queued stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Identities of the queued stages, in order.
    #[must_use]
    pub fn identities(&self) -> Vec<StageIdentity> {
        self.stages.iter().map(|s| s.identity()).collect()
    }

    /// A handle that interrupts the run when cancelled.
    #[must_use]
    pub fn interrupt_handle(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.interrupt)
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// The run identifier.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn position(&self, identity: StageIdentity) -> Option<usize> {
        self.stages.iter().position(|s| s.identity() == identity)
    }

    fn renumber(&mut self) {
        for (index, stage) in self.stages.iter_mut().enumerate() {
            stage.set_ordinal(Some(index + 1));
        }
    }

    /// Runs every queued stage in order.
    ///
    /// A stage that fails, is interrupted, or returns an error halts the run; later
    /// stages are never launched. Errors are recorded in the report rather than
    /// returned.
    pub async fn run(&mut self) -> PipelineReport {
        let labels: Vec<_> = self.stages.iter().map(|s| s.identity().label()).collect();
        info!(run_id = %self.run_id, stages = self.stages.len(), "Starting pipeline");
        self.sink
            .emit(
                "pipeline.started",
                Some(json!({ "run_id": self.run_id, "stages": labels })),
            )
            .await;

        let mut reports = Vec::with_capacity(self.stages.len());
        let mut carried = self.initial_inputs.clone();
        let mut halted = false;
        let total = self.stages.len();

        for (index, stage) in self.stages.iter_mut().enumerate() {
            self.state = PipelineState::Running(index);
            let identity = stage.identity();
            if let Some(inputs) = carried.take() {
                stage.set_input_files(inputs);
            }

            let started_at = Utc::now();
            if self.interrupt.is_cancelled() {
                warn!(stage = %identity, "Pipeline interrupted before stage started");
                reports.push(StageReport {
                    identity,
                    result: Some(StageResult::interrupted()),
                    error: None,
                    outputs: Vec::new(),
                    started_at,
                    finished_at: started_at,
                });
                halted = true;
                break;
            }

            info!(stage = %identity, "Running stage {}/{total}", index + 1);
            let launched = MonitoredStage::new(&mut **stage)
                .with_settings(self.monitor.clone())
                .with_sink(Arc::clone(&self.sink))
                .launch(&self.interrupt)
                .await;

            let mut report = StageReport {
                identity,
                result: None,
                error: None,
                outputs: stage.output_files().to_vec(),
                started_at,
                finished_at: Utc::now(),
            };
            match launched {
                Ok(result) => {
                    let stop = result.outcome().halts_pipeline();
                    report.result = Some(result);
                    reports.push(report);
                    if stop {
                        halted = true;
                        break;
                    }
                    carried = Some(stage.output_files().to_vec());
                }
                Err(e) => {
                    error!(stage = %identity, error = %e, "Stage raised an error, halting");
                    report.error = Some(e.to_string());
                    reports.push(report);
                    halted = true;
                    break;
                }
            }
        }

        self.state = if halted {
            PipelineState::Halted
        } else {
            PipelineState::Completed
        };

        let report = PipelineReport {
            run_id: self.run_id,
            state: self.state,
            stages: reports,
        };
        match report.halted_at() {
            Some(last) => {
                warn!(run_id = %self.run_id, stage = %last.identity, "Pipeline halted");
                self.sink
                    .emit(
                        "pipeline.halted",
                        Some(json!({
                            "run_id": self.run_id,
                            "stage": last.identity.label(),
                            "outcome": last.outcome(),
                            "error": last.error,
                        })),
                    )
                    .await;
            }
            None => {
                info!(run_id = %self.run_id, "Pipeline completed");
                self.sink
                    .emit(
                        "pipeline.completed",
                        Some(json!({ "run_id": self.run_id, "stages": report.stages.len() })),
                    )
                    .await;
            }
        }
        report
    }
}
