//! OTU clustering with `usearch -cluster_otus`.

use super::{run_tool, Stage, StageState};
use crate::cancellation::CancellationToken;
use crate::command::{CommandConfig, ConfigLoader, ExternalCommand};
use crate::core::{StageIdentity, StageResult};
use crate::errors::{OtuflowError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

const CONFIG_NAME: &str = "otucluster";
const OTUS: &str = "otus.fasta";
const UPARSE_OUT: &str = "uparseout.up";
const LOG: &str = "clusterotu.log";

/// Clusters dereplicated sequences into OTUs.
///
/// Inputs are the dereplicated file and the pooled reads. Outputs are `otus.fasta`
/// followed by the pooled reads, which pass through to mapping.
#[derive(Debug)]
pub struct ClusteringStage {
    state: StageState,
    loader: Arc<ConfigLoader>,
}

impl ClusteringStage {
    /// Creates a clustering stage.
    #[must_use]
    pub fn new(loader: Arc<ConfigLoader>) -> Self {
        Self {
            state: StageState::new(StageIdentity::OtuClustering),
            loader,
        }
    }
}

fn cluster_command(uniques: &Path, dir: &Path, config: &CommandConfig) -> ExternalCommand {
    let mut command = ExternalCommand::new("usearch");
    command
        .path_arg("-cluster_otus", uniques)
        .path_arg("-otus", &dir.join(OTUS))
        .path_arg("-uparseout", &dir.join(UPARSE_OUT))
        .arg("-relabel", "OTU_");
    config.apply(&mut command);
    command.with_stderr(dir.join(LOG))
}

#[async_trait]
impl Stage for ClusteringStage {
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
        let command = cluster_command(&inputs[0], &dir, &config);
        if !run_tool(self.state.identity(), command, cancel, &mut result).await? {
            return Ok(StageResult::interrupted());
        }
        if !result.outcome().is_failure() {
            self.state.add_output(dir.join(OTUS));
            self.state.add_output(inputs[1].clone());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_command_line_shape() {
        let config = CommandConfig::parse("ARG -relabel Otu\nVAL -sizeout\n").unwrap();
        let cmd = cluster_command(Path::new("uniques.fasta"), Path::new("/out"), &config);
        assert_eq!(
            cmd.argv(),
            vec![
                "usearch",
                "-cluster_otus",
                "uniques.fasta",
                "-otus",
                "/out/otus.fasta",
                "-uparseout",
                "/out/uparseout.up",
                "-relabel",
                "Otu",
                "-sizeout",
            ]
        );
        assert_eq!(cmd.stderr_path(), Some(Path::new("/out/clusterotu.log")));
    }

    #[tokio::test]
    async fn test_one_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut stage = ClusteringStage::new(Arc::new(ConfigLoader::new(dir.path())));
        stage.set_output_root(dir.path());
        stage.set_input_files(vec![PathBuf::from("only.fasta")]);
        let err = stage.launch(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Wrong file number: 2 expected but 1 found");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_outputs_otus_then_reads() {
        use crate::testing::{write_script, write_tool_config};

        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // $4 is the -otus target.
        write_script(dir.path(), "cluster.sh", "echo '>OTU_1' > \"$4\"").unwrap();
        write_tool_config(dir.path(), CONFIG_NAME, dir.path(), "cluster.sh", &[]).unwrap();
        let uniques = dir.path().join("dereplicated.fasta");
        let reads = dir.path().join("pooled.fasta");
        std::fs::write(&uniques, ">u\nA\n").unwrap();
        std::fs::write(&reads, ">r\nA\n").unwrap();

        let mut stage = ClusteringStage::new(Arc::new(ConfigLoader::new(dir.path())));
        stage.set_output_root(out.path());
        stage.set_input_files(vec![uniques, reads.clone()]);
        let result = stage.launch(&CancellationToken::new()).await.unwrap();

        assert_eq!(result.outcome(), StageOutcome::Passed);
        assert_eq!(stage.output_files().len(), 2);
        assert!(stage.output_files()[0].ends_with("clustered/otus.fasta"));
        assert_eq!(stage.output_files()[1], reads);
        assert_eq!(
            std::fs::read_to_string(&stage.output_files()[0]).unwrap(),
            ">OTU_1\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        use crate::testing::{write_script, write_tool_config};

        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_script(dir.path(), "cluster.sh", "exit 1").unwrap();
        write_tool_config(dir.path(), CONFIG_NAME, dir.path(), "cluster.sh", &[]).unwrap();
        let a = dir.path().join("a.fasta");
        let b = dir.path().join("b.fasta");
        std::fs::write(&a, ">a\nA\n").unwrap();
        std::fs::write(&b, ">b\nA\n").unwrap();

        let mut stage = ClusteringStage::new(Arc::new(ConfigLoader::new(dir.path())));
        stage.set_output_root(out.path());
        stage.set_input_files(vec![a, b]);
        let result = stage.launch(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::Failed);
        assert!(result.fails().iter().next().unwrap().contains("clusterotu.log"));
    }
}
