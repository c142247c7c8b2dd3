//! Collapses identical sequences into abundance-annotated uniques.

use super::pool::blocking;
use super::{Stage, StageState};
use crate::cancellation::CancellationToken;
use crate::core::{StageIdentity, StageResult};
use crate::errors::{OtuflowError, Result};
use crate::utils::{for_each_sequence, format_fasta, FASTA_LINE_WIDTH};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

const OUTPUT_NAME: &str = "dereplicated.fasta";

/// A unique sequence and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueSequence {
    /// Upper-cased bases.
    pub sequence: Vec<u8>,
    /// Number of occurrences in the input.
    pub count: u64,
}

/// Counts identical sequences, case-insensitively.
///
/// Uniques come back by decreasing count; ties keep first-seen order.
///
/// # Errors
///
/// Returns an error if the input cannot be read or the token fires.
pub fn count_uniques(path: &Path, cancel: &CancellationToken) -> Result<Vec<UniqueSequence>> {
    let mut seen: HashMap<Vec<u8>, (u64, usize)> = HashMap::new();
    for_each_sequence(path, |_, seq| {
        if cancel.is_cancelled() {
            return Err(OtuflowError::Cancelled("dereplication".to_string()));
        }
        let next = seen.len();
        seen.entry(seq.to_ascii_uppercase())
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, next));
        Ok(())
    })?;

    let mut uniques: Vec<_> = seen.into_iter().collect();
    uniques.sort_by(|(_, (a, first_a)), (_, (b, first_b))| b.cmp(a).then(first_a.cmp(first_b)));
    Ok(uniques
        .into_iter()
        .map(|(sequence, (count, _))| UniqueSequence { sequence, count })
        .collect())
}

fn write_uniques(path: &Path, uniques: &[UniqueSequence], min_size: u64) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut written = 0;
    for unique in uniques.iter().filter(|u| u.count >= min_size) {
        written += 1;
        writeln!(
            writer,
            ">Dereplicated_sequence_{written};size={}\n{}",
            unique.count,
            format_fasta(&unique.sequence, FASTA_LINE_WIDTH)
        )?;
    }
    writer.flush()?;
    Ok(written)
}

/// Dereplicates one pooled FASTA file.
///
/// Outputs are the dereplicated file followed by the original input, which the mapping
/// stage needs downstream.
#[derive(Debug)]
pub struct DereplicationStage {
    state: StageState,
    min_size: u64,
}

impl Default for DereplicationStage {
    fn default() -> Self {
        Self::new()
    }
}

impl DereplicationStage {
    /// Creates a stage that keeps every unique.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StageState::new(StageIdentity::Dereplication),
            min_size: 1,
        }
    }

    /// Drops uniques seen fewer than `min_size` times.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size.max(1);
        self
    }
}

#[async_trait]
impl Stage for DereplicationStage {
    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    async fn launch(&mut self, cancel: &CancellationToken) -> Result<StageResult> {
        let (inputs, extra) = self.state.expect_inputs(1)?;
        let input = inputs[0].clone();
        if !input.is_file() {
            return Err(OtuflowError::MissingInput(input));
        }
        let dir = self.state.prepare()?;
        let output = dir.join(OUTPUT_NAME);

        let token = cancel.child();
        let min_size = self.min_size;
        let work = {
            let (input, output) = (input.clone(), output.clone());
            blocking(move || {
                let uniques = count_uniques(&input, &token)?;
                debug!(uniques = uniques.len(), "Counted unique sequences");
                let written = write_uniques(&output, &uniques, min_size)?;
                Ok((uniques.len(), written))
            })
        };
        let (uniques, written) = match work.await {
            Ok(counts) => counts,
            Err(e) if e.is_cancellation() => return Ok(StageResult::interrupted()),
            Err(e) => return Err(e),
        };

        let mut result = StageResult::passed();
        if let Some(warning) = extra {
            result.add_warning(warning);
        }
        info!(stage = %self.state.identity(), uniques, written, min_size, "Dereplicated sequences");
        if written == 0 {
            result.add_fail(format!(
                "No unique sequence reached the minimum size of {min_size}"
            ));
        }
        self.state.add_output(output);
        self.state.add_output(input);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutcome;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn pooled(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("pooled.fasta");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_counts_are_sorted_with_stable_ties() {
        let dir = tempfile::tempdir().unwrap();
        let path = pooled(dir.path(), ">a\nTT\n>b\nGG\n>c\ngg\n>d\nAA\n>e\nCC\n>f\nCC\n");
        let uniques = count_uniques(&path, &CancellationToken::new()).unwrap();
        let summary: Vec<_> = uniques
            .iter()
            .map(|u| (String::from_utf8(u.sequence.clone()).unwrap(), u.count))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("GG".to_string(), 2),
                ("CC".to_string(), 2),
                ("TT".to_string(), 1),
                ("AA".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_writes_sizes_and_keeps_input() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = pooled(in_dir.path(), ">a\nACGT\n>b\nACGT\n>c\nTTTT\n");

        let mut stage = DereplicationStage::new().with_min_size(2);
        stage.set_output_root(out_dir.path());
        stage.set_input_files(vec![input.clone()]);
        let result = stage.launch(&CancellationToken::new()).await.unwrap();

        assert_eq!(result.outcome(), StageOutcome::Passed);
        assert_eq!(stage.output_files().len(), 2);
        assert_eq!(stage.output_files()[1], input);
        let text = std::fs::read_to_string(&stage.output_files()[0]).unwrap();
        assert_eq!(text, ">Dereplicated_sequence_1;size=2\nACGT\n");
    }

    #[tokio::test]
    async fn test_nothing_above_min_size_fails() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = pooled(in_dir.path(), ">a\nACGT\n");

        let mut stage = DereplicationStage::new().with_min_size(5);
        stage.set_output_root(out_dir.path());
        stage.set_input_files(vec![input]);
        let result = stage.launch(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::Failed);
    }

    #[tokio::test]
    async fn test_extra_inputs_warn() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = pooled(in_dir.path(), ">a\nACGT\n");

        let mut stage = DereplicationStage::new();
        stage.set_output_root(out_dir.path());
        stage.set_input_files(vec![input, in_dir.path().join("ignored.fasta")]);
        let result = stage.launch(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::PassedWithWarnings);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_interrupted() {
        let in_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = pooled(in_dir.path(), ">a\nACGT\n");

        let mut stage = DereplicationStage::new();
        stage.set_output_root(out_dir.path());
        stage.set_input_files(vec![input]);
        let token = CancellationToken::new();
        token.cancel("stop");
        let result = stage.launch(&token).await.unwrap();
        assert_eq!(result.outcome(), StageOutcome::Interrupted);
    }
}
