//! Maps pooled reads back onto OTU centroids with `usearch -usearch_global`.

use super::{run_tool, Stage, StageState};
use crate::cancellation::CancellationToken;
use crate::command::{CommandConfig, ConfigLoader, ExternalCommand};
use crate::core::{StageIdentity, StageResult};
use crate::errors::{OtuflowError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

const CONFIG_NAME: &str = "usearchglobal";
const MAP: &str = "map.uc";
const LOG: &str = "mapping.log";

/// Writes `map.uc` from the OTU file (first input) and pooled reads (second input).
#[derive(Debug)]
pub struct MappingStage {
    state: StageState,
    loader: Arc<ConfigLoader>,
}

impl MappingStage {
    /// Creates a mapping stage.
    #[must_use]
    pub fn new(loader: Arc<ConfigLoader>) -> Self {
        Self {
            state: StageState::new(StageIdentity::Mapping),
            loader,
        }
    }
}

fn mapping_command(otus: &Path, reads: &Path, dir: &Path, config: &CommandConfig) -> ExternalCommand {
    let mut command = ExternalCommand::new("usearch");
    command
        .path_arg("-usearch_global", reads)
        .path_arg("-db", otus)
        .path_arg("-uc", &dir.join(MAP));
    config.apply(&mut command);
    command.with_stderr(dir.join(LOG))
}

#[async_trait]
impl Stage for MappingStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, cancel: &CancellationToken) -> Result<StageResult> {
        let (inputs, extra) = self.state.expect_inputs(2)?;
        if let Some(missing) = inputs.iter().find(|p| !p.is_file()) {
            return Err(OtuflowError::MissingInput(missing.clone()));
        }
        let config = self.loader.load(CONFIG_NAME)?;
        let dir = self.state.prepare()?;

        let mut result = StageResult::passed();
        if let Some(warning) = extra {
            result.add_warning(warning);
        }
        let command = mapping_command(&inputs[0], &inputs[1], &dir, &config);
        if !run_tool(self.state.identity(), command, cancel, &mut result).await? {
            return Ok(StageResult::interrupted());
        }
        if !result.outcome().is_failure() {
            self.state.add_output(dir.join(MAP));
        }
        Ok(result)
    }
}
