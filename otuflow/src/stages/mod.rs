//! Stage trait and implementations.
//!
//! Stages are the units of work in an otuflow pipeline. Each one owns a
//! [`StageState`] and implements [`Stage::launch`]; everything else has a default
//! implementation that reads or updates that state.

mod assembly;
mod clustering;
mod dereplication;
mod mapping;
mod monitor;
pub mod pool;
mod pooling;
mod state;
mod tabling;
mod trimming;

pub use assembly::AssemblyStage;
pub use clustering::ClusteringStage;
pub use dereplication::DereplicationStage;
pub use mapping::MappingStage;
pub use monitor::MonitoredStage;
pub use pooling::PoolingStage;
pub use state::StageState;
pub use tabling::TablingStage;
pub use trimming::TrimmingStage;

use crate::cancellation::CancellationToken;
use crate::command::{CommandExit, ExternalCommand};
use crate::core::{StageIdentity, StageResult};
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Debug {
    /// The stage's bookkeeping record.
    fn state(&self) -> &StageState;

    /// Mutable access to the bookkeeping record.
    fn state_mut(&mut self) -> &mut StageState;

    /// Runs the stage.
    ///
    /// Writes under [`output_dir`](Self::output_dir) and records produced files in
    /// [`output_files`](Self::output_files). Recoverable problems are reported as
    /// messages on the returned result; an `Err` is reserved for contract violations
    /// and I/O failures. Implementations stop early once `cancel` fires and return
    /// [`StageResult::interrupted`].
    async fn launch(&mut self, cancel: &CancellationToken) -> Result<StageResult>;

    /// The stage identity.
    fn identity(&self) -> StageIdentity {
        self.state().identity()
    }

    /// Sets the input files.
    fn set_input_files(&mut self, files: Vec<PathBuf>) {
        self.state_mut().set_inputs(files);
    }

    /// The input files, if set.
    fn input_files(&self) -> Option<&[PathBuf]> {
        self.state().inputs()
    }

    /// Sets the shared output root.
    fn set_output_root(&mut self, root: &Path) {
        self.state_mut().set_output_root(root);
    }

    /// Sets the ordinal prefixed to the output subdirectory.
    fn set_ordinal(&mut self, ordinal: Option<usize>) {
        self.state_mut().set_ordinal(ordinal);
    }

    /// The stage's output directory.
    fn output_dir(&self) -> PathBuf {
        self.state().output_dir()
    }

    /// Files produced by the last launch.
    fn output_files(&self) -> &[PathBuf] {
        self.state().outputs()
    }
}

/// Runs one external tool for a stage and folds its exit into `result`.
///
/// Returns false if the run was cancelled.
pub(crate) async fn run_tool(
    identity: StageIdentity,
    command: ExternalCommand,
    cancel: &CancellationToken,
    result: &mut StageResult,
) -> Result<bool> {
    let log = command.stderr_path().map(Path::to_path_buf);
    let program = command.program().to_string();
    info!(stage = %identity, command = %command, "Running external tool");

    match command.execute(cancel).await? {
        CommandExit::Cancelled => return Ok(false),
        exit if exit.success() => {}
        exit => {
            warn!(stage = %identity, program = %program, %exit, "External tool failed");
            let message = match log {
                Some(log) => format!("{program} finished with {exit}, check log file {}", log.display()),
                None => format!("{program} finished with {exit}"),
            };
            result.add_fail(message);
        }
    }
    Ok(true)
}
