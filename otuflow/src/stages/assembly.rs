//! Paired-end read assembly with PANDAseq.

use super::pool::{FanOut, FanOutOutcome};
use super::{Stage, StageState};
use crate::cancellation::CancellationToken;
use crate::command::{CommandConfig, CommandExit, ConfigLoader, ExternalCommand};
use crate::config::{MatePair, QualityEncoding};
use crate::core::{StageIdentity, StageResult};
use crate::errors::{OtuflowError, Result, WrongInputCountError};
use crate::utils::file_name;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const CONFIG_NAME: &str = "pandaseq";
const OUTPUT_SUFFIX: &str = "_assembled.fasta";

/// Splits `inputs` into sorted forward and reverse lists by mate token.
///
/// # Errors
///
/// Fails if no forward file is found or the two lists differ in length.
pub fn pair_mates(inputs: &[PathBuf], mates: &MatePair) -> Result<Vec<(PathBuf, PathBuf)>> {
    let select = |token: &str| {
        let mut files: Vec<_> = inputs
            .iter()
            .filter(|p| file_name(p).contains(token))
            .cloned()
            .collect();
        files.sort();
        files
    };
    let forward = select(&mates.forward);
    let reverse = select(&mates.reverse);

    if forward.len() != reverse.len() {
        return Err(OtuflowError::MatePairMismatch {
            forward: forward.len(),
            reverse: reverse.len(),
        });
    }
    if forward.is_empty() {
        return Err(WrongInputCountError::new(2, 0).into());
    }
    Ok(forward.into_iter().zip(reverse).collect())
}

/// Merges each forward/reverse pair into `<forward name>_assembled.fasta`.
///
/// One `pandaseq` process runs per pair, at most `threads` at a time. Standard output
/// becomes the assembled file and standard error goes to `<output>.log`. Settings from
/// `pandaseq.config` are applied after the defaults.
#[derive(Debug)]
pub struct AssemblyStage {
    state: StageState,
    loader: Arc<ConfigLoader>,
    mates: MatePair,
    threads: usize,
    encoding: QualityEncoding,
}

impl AssemblyStage {
    /// Creates an assembly stage.
    #[must_use]
    pub fn new(loader: Arc<ConfigLoader>, mates: MatePair) -> Self {
        Self {
            state: StageState::new(StageIdentity::Assembly),
            loader,
            mates,
            threads: 1,
            encoding: QualityEncoding::default(),
        }
    }

    /// Sets how many pairs are assembled at once.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Sets the quality encoding; Phred+64 adds `-6`.
    #[must_use]
    pub fn with_encoding(mut self, encoding: QualityEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

fn pandaseq_command(
    forward: &Path,
    reverse: &Path,
    encoding: QualityEncoding,
    output: &Path,
    config: &CommandConfig,
) -> ExternalCommand {
    let mut command = ExternalCommand::new("pandaseq");
    command.path_arg("-f", forward).path_arg("-r", reverse);
    if encoding == QualityEncoding::Phred64 {
        command.flag("-6");
    }
    config.apply(&mut command);

    let mut log = output.as_os_str().to_owned();
    log.push(".log");
    command.with_stdout(output).with_stderr(PathBuf::from(log))
}

#[async_trait]
impl Stage for AssemblyStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, cancel: &CancellationToken) -> Result<StageResult> {
        let pairs = pair_mates(self.state.require_inputs()?, &self.mates)?;
        let config = Arc::new(self.loader.load(CONFIG_NAME)?);
        let dir = self.state.prepare()?;

        let forwards: Vec<_> = pairs.iter().map(|(f, _)| f.clone()).collect();
        let reverse_of: Arc<HashMap<PathBuf, PathBuf>> = Arc::new(pairs.into_iter().collect());
        let encoding = self.encoding;

        let outcome = FanOut::new(self.threads)
            .run(forwards, cancel, |forward, token| {
                let output = dir.join(format!("{}{OUTPUT_SUFFIX}", file_name(&forward)));
                let reverse = reverse_of.get(&forward).cloned().unwrap_or_default();
                let command = pandaseq_command(&forward, &reverse, encoding, &output, &config);
                async move {
                    let log = command.stderr_path().map(Path::to_path_buf).unwrap_or_default();
                    info!(command = %command, "Assembling pair");
                    let exit = command.execute(&token).await?;
                    Ok((output, log, exit))
                }
            })
            .await?;

        let FanOutOutcome::Finished(report) = outcome else {
            return Ok(StageResult::interrupted());
        };

        let mut result = StageResult::passed();
        for (forward, (output, log, exit)) in report.completed {
            match exit {
                CommandExit::Cancelled => {}
                exit if exit.success() => self.state.add_output(output),
                exit => {
                    warn!(pair = %forward.display(), %exit, "pandaseq failed");
                    result.add_fail(format!(
                        "pandaseq finished with {exit} on {}, check log file {}",
                        file_name(&forward),
                        log.display()
                    ));
                }
            }
        }
        Ok(result)
    }
}
