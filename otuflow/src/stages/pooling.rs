//! Pools many sequence files into one labelled FASTA file.

use super::pool::{blocking, summarize_fan_out, FailureMode, FanOut, FanOutOutcome, SharedSink};
use super::{Stage, StageState};
use crate::cancellation::CancellationToken;
use crate::core::{StageIdentity, StageResult};
use crate::errors::{OtuflowError, Result, WrongInputCountError};
use crate::utils::{barcode_header, file_name, for_each_sequence, format_fasta, truncate, FASTA_LINE_WIDTH};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const OUTPUT_NAME: &str = "pooled.fasta";

/// Rewrites every record of every input as `>{id};barcodelabel={file name}` into a
/// single `pooled.fasta`.
///
/// Inputs are read concurrently. Each input is parsed in full before its records reach
/// the pooled file, so an input that fails part way contributes nothing. A failing input
/// becomes a warning; the stage fails only if no record was written at all.
#[derive(Debug)]
pub struct PoolingStage {
    state: StageState,
    threads: usize,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl Default for PoolingStage {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolingStage {
    /// Creates a single-threaded pooling stage without length limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StageState::new(StageIdentity::Pooling),
            threads: 1,
            min_length: None,
            max_length: None,
        }
    }

    /// Sets how many inputs are read at once.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Drops records shorter than `min` and cuts records longer than `max`.
    #[must_use]
    pub fn with_truncation(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }
}

fn pool_file(
    input: &Path,
    sink: &SharedSink<BufWriter<File>>,
    window: (Option<usize>, Option<usize>),
    cancel: &CancellationToken,
) -> Result<u64> {
    let barcode = file_name(input);
    let mut pooled = String::new();
    let mut written = 0;
    for_each_sequence(input, |id, seq| {
        if cancel.is_cancelled() {
            return Err(OtuflowError::Cancelled(format!("pooling {barcode}")));
        }
        if let Some(seq) = truncate(seq, window.0, window.1) {
            pooled.push_str(&barcode_header(id, &barcode));
            pooled.push('\n');
            pooled.push_str(&format_fasta(seq, FASTA_LINE_WIDTH));
            pooled.push('\n');
            written += 1;
        }
        Ok(())
    })?;
    sink.with(|w| w.write_all(pooled.as_bytes()))?;
    Ok(written)
}

#[async_trait]
impl Stage for PoolingStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, cancel: &CancellationToken) -> Result<StageResult> {
        let inputs = self.state.require_inputs()?.to_vec();
        if inputs.is_empty() {
            return Err(WrongInputCountError::new(1, 0).into());
        }
        let dir = self.state.prepare()?;
        let output = dir.join(OUTPUT_NAME);
        let sink = SharedSink::new(BufWriter::new(File::create(&output)?));
        self.state.add_output(&output);

        let window = (self.min_length, self.max_length);
        let pool = FanOut::new(self.threads).with_mode(FailureMode::ContinueOnFailure);
        let outcome = pool
            .run(inputs, cancel, |input, token| {
                let sink = sink.clone();
                blocking(move || pool_file(&input, &sink, window, &token))
            })
            .await?;

        let FanOutOutcome::Finished(report) = outcome else {
            return Ok(StageResult::interrupted());
        };
        sink.flush()?;

        let mut result = StageResult::passed();
        let records = summarize_fan_out(&report, &mut result, |n| *n);
        info!(
            stage = %self.state.identity(),
            records,
            files = report.completed.len(),
            failed = report.failed.len(),
            "Pooled sequences into {}",
            output.display()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_pools_with_barcode_labels() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let a = write(input_dir.path(), "S1.fasta", ">r1\nacgt\n");
        let b = write(input_dir.path(), "S2.fasta", ">r2\nGGCC\n>r3\nTT\n");

        let mut stage = PoolingStage::new().with_threads(1).with_truncation(Some(3), Some(3));
        stage.set_output_root(out_dir.path());
        stage.set_input_files(vec![a, b]);

        let result = stage.launch(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::Passed);

        let pooled = std::fs::read_to_string(&stage.output_files()[0]).unwrap();
        assert_eq!(
            pooled,
            ">r1;barcodelabel=S1.fasta\nACG\n>r2;barcodelabel=S2.fasta\nGGC\n"
        );
    }

    #[tokio::test]
    async fn test_one_bad_input_is_a_warning() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let good = write(input_dir.path(), "good.fasta", ">r1\nACGT\n");
        let also_good = write(input_dir.path(), "fine.fasta", ">r2\nACGT\n");
        let missing = input_dir.path().join("missing.fasta");

        let mut stage = PoolingStage::new().with_threads(3);
        stage.set_output_root(out_dir.path());
        stage.set_input_files(vec![good, missing, also_good]);

        let result = stage.launch(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::PassedWithWarnings);
        assert_eq!(result.warnings().len(), 1);
        assert!(result.warnings().iter().next().unwrap().contains("missing.fasta"));
    }

    #[tokio::test]
    async fn test_input_failing_part_way_adds_no_records() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let good = write(input_dir.path(), "good.fasta", ">r1\nACGT\n");
        let broken = write(
            input_dir.path(),
            "broken.fastq",
            "@p1\nACGT\n+\nIIII\n@p2\nACGT\nnot a separator\nIIII\n",
        );

        let mut stage = PoolingStage::new().with_threads(2);
        stage.set_output_root(out_dir.path());
        stage.set_input_files(vec![broken, good]);

        let result = stage.launch(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::PassedWithWarnings);
        assert!(result.warnings().iter().next().unwrap().contains("broken.fastq"));

        let pooled = std::fs::read_to_string(&stage.output_files()[0]).unwrap();
        assert_eq!(pooled, ">r1;barcodelabel=good.fasta\nACGT\n");
    }

    #[tokio::test]
    async fn test_nothing_pooled_is_a_failure() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let empty = write(input_dir.path(), "empty.fasta", "");
        let missing = input_dir.path().join("missing.fasta");

        let mut stage = PoolingStage::new();
        stage.set_output_root(out_dir.path());
        stage.set_input_files(vec![empty, missing]);

        let result = stage.launch(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::FailedWithWarnings);
    }

    #[tokio::test]
    async fn test_empty_input_list_is_an_error() {
        let out_dir = tempfile::tempdir().unwrap();
        let mut stage = PoolingStage::new();
        stage.set_output_root(out_dir.path());
        stage.set_input_files(Vec::new());
        let err = stage.launch(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OtuflowError::InputCount(_)));
    }
}
