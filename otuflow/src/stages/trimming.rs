//! 3' quality trimming of FASTQ reads.

use super::pool::{blocking, FanOut, FanOutOutcome};
use super::{Stage, StageState};
use crate::cancellation::CancellationToken;
use crate::config::QualityEncoding;
use crate::core::{StageIdentity, StageResult};
use crate::errors::{OtuflowError, Result, WrongInputCountError};
use crate::utils::{file_name, is_gzipped, open_reader, quality_cut_index};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use seq_io::fastq::{Reader as FastqReader, Record};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default quality cutoff.
pub const DEFAULT_CUTOFF: u8 = 20;

enum OutputWriter {
    Plain(BufWriter<File>),
    Gzipped(GzEncoder<BufWriter<File>>),
}

impl OutputWriter {
    fn create(path: &Path, gzip: bool) -> io::Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        Ok(if gzip {
            Self::Gzipped(GzEncoder::new(file, Compression::default()))
        } else {
            Self::Plain(file)
        })
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Gzipped(w) => w.finish()?.flush(),
        }
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzipped(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzipped(w) => w.flush(),
        }
    }
}

/// Cuts low-quality 3' ends from every read of every FASTQ input.
///
/// Each input produces one output of the same name in the stage directory; gzipped
/// inputs produce gzipped outputs. The first unreadable input stops the stage.
#[derive(Debug)]
pub struct TrimmingStage {
    state: StageState,
    threads: usize,
    cutoff: u8,
    encoding: QualityEncoding,
}

impl Default for TrimmingStage {
    fn default() -> Self {
        Self::new()
    }
}

impl TrimmingStage {
    /// Creates a trimming stage with the default cutoff and Phred+33 qualities.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StageState::new(StageIdentity::Trimming),
            threads: 1,
            cutoff: DEFAULT_CUTOFF,
            encoding: QualityEncoding::default(),
        }
    }

    /// Sets how many inputs are trimmed at once.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Sets the quality cutoff.
    #[must_use]
    pub fn with_cutoff(mut self, cutoff: u8) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Sets the quality encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: QualityEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

struct TrimJob {
    output: PathBuf,
    offset: u8,
    cutoff: u8,
}

fn trim_file(input: &Path, job: &TrimJob, cancel: &CancellationToken) -> Result<u64> {
    let gzip = is_gzipped(input)?;
    let mut reader = FastqReader::new(open_reader(input)?);
    let mut writer = OutputWriter::create(&job.output, gzip)?;
    let mut reads = 0;

    while let Some(record) = reader.next() {
        if cancel.is_cancelled() {
            return Err(OtuflowError::Cancelled(format!("trimming {}", file_name(input))));
        }
        let record = record.map_err(|e| OtuflowError::sequence(input, e))?;
        let cut = quality_cut_index(record.qual(), job.offset, job.cutoff);
        writer.write_all(b"@")?;
        writer.write_all(record.head())?;
        writer.write_all(b"\n")?;
        writer.write_all(&record.seq()[..cut])?;
        writer.write_all(b"\n+\n")?;
        writer.write_all(&record.qual()[..cut])?;
        writer.write_all(b"\n")?;
        reads += 1;
    }
    writer.finish()?;
    Ok(reads)
}

#[async_trait]
impl Stage for TrimmingStage {
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
        self.state.check_inputs_exist()?;
        let dir = self.state.prepare()?;

        let (offset, cutoff) = (self.encoding.offset(), self.cutoff);
        let outcome = FanOut::new(self.threads)
            .run(inputs, cancel, |input, token| {
                let job = TrimJob {
                    output: dir.join(file_name(&input)),
                    offset,
                    cutoff,
                };
                blocking(move || {
                    let reads = trim_file(&input, &job, &token)?;
                    Ok((job.output, reads))
                })
            })
            .await?;

        let FanOutOutcome::Finished(report) = outcome else {
            return Ok(StageResult::interrupted());
        };

        let mut total = 0;
        for (_, (output, reads)) in report.completed {
            self.state.add_output(output);
            total += reads;
        }
        info!(stage = %self.state.identity(), reads = total, cutoff, "Trimmed reads");

        let mut result = StageResult::passed();
        if total == 0 {
            result.add_fail("No reads found in the trimming inputs");
        }
        Ok(result)
    }
}
