//! Builds the OTU table from the mapping results with `uc2otutab.py`.

use super::{run_tool, Stage, StageState};
use crate::cancellation::CancellationToken;
use crate::command::{CommandConfig, ConfigLoader, ExternalCommand};
use crate::core::{StageIdentity, StageResult};
use crate::errors::{OtuflowError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

const CONFIG_NAME: &str = "uc2otutab";
const TABLE: &str = "otu_table.csv";
const LOG: &str = "table.log";

/// Runs `python uc2otutab.py <map.uc>` with standard output captured as
/// `otu_table.csv`, the final product of the pipeline.
#[derive(Debug)]
pub struct TablingStage {
    state: StageState,
    loader: Arc<ConfigLoader>,
    interpreter: String,
}

impl TablingStage {
    /// Creates a tabling stage.
    #[must_use]
    pub fn new(loader: Arc<ConfigLoader>) -> Self {
        Self {
            state: StageState::new(StageIdentity::Tabling),
            loader,
            interpreter: "python".to_string(),
        }
    }

    /// Replaces the interpreter the script runs under.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }
}

fn table_command(interpreter: &str, map: &Path, dir: &Path, config: &CommandConfig) -> ExternalCommand {
    let mut command = ExternalCommand::new("uc2otutab.py").with_launcher(interpreter);
    command.flag(map.to_string_lossy());
    config.apply(&mut command);
    command.with_stdout(dir.join(TABLE)).with_stderr(dir.join(LOG))
}

#[async_trait]
impl Stage for TablingStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, cancel: &CancellationToken) -> Result<StageResult> {
        let (inputs, extra) = self.state.expect_inputs(1)?;
        let map = &inputs[0];
        if !map.is_file() {
            return Err(OtuflowError::MissingInput(map.clone()));
        }
        let config = self.loader.load(CONFIG_NAME)?;
        let dir = self.state.prepare()?;

        let mut result = StageResult::passed();
        if let Some(warning) = extra {
            result.add_warning(warning);
        }
        let command = table_command(&self.interpreter, map, &dir, &config);
        if !run_tool(self.state.identity(), command, cancel, &mut result).await? {
            return Ok(StageResult::interrupted());
        }
        if !result.outcome().is_failure() {
            self.state.add_output(dir.join(TABLE));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_uses_python_launcher() {
        let config = CommandConfig::parse("ENV /opt/scripts\n").unwrap();
        let cmd = table_command("python", Path::new("map.uc"), Path::new("/out"), &config);
        assert_eq!(cmd.argv(), vec!["python", "/opt/scripts/uc2otutab.py", "map.uc"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_becomes_table() {
        use crate::testing::{write_script, write_tool_config};

        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_script(dir.path(), "tab.sh", "printf 'OTUId\\tS1\\n'; echo \"read $1\" >&2").unwrap();
        write_tool_config(dir.path(), CONFIG_NAME, dir.path(), "tab.sh", &[]).unwrap();
        let map = dir.path().join("map.uc");
        std::fs::write(&map, "H\t0\n").unwrap();

        let mut stage = TablingStage::new(Arc::new(ConfigLoader::new(dir.path()))).with_interpreter("sh");
        stage.set_output_root(out.path());
        stage.set_input_files(vec![map]);
        let result = stage.launch(&CancellationToken::new()).await.unwrap();

        assert_eq!(result.outcome(), StageOutcome::Passed);
        let table = &stage.output_files()[0];
        assert!(table.ends_with("table/otu_table.csv"));
        assert_eq!(std::fs::read_to_string(table).unwrap(), "OTUId\tS1\n");
        let log = std::fs::read_to_string(stage.output_dir().join(LOG)).unwrap();
        assert!(log.contains("map.uc"));
    }

    #[tokio::test]
    async fn test_missing_config_stops_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = TablingStage::new(Arc::new(ConfigLoader::new(dir.path().join("none"))));
        let map = dir.path().join("map.uc");
        std::fs::write(&map, "").unwrap();
        stage.set_output_root(dir.path());
        stage.set_input_files(vec![map]);
        let err = stage.launch(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OtuflowError::Config(_)));
        assert!(!stage.output_dir().exists());
    }
}
