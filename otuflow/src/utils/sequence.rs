//! FASTA/FASTQ reading and formatting helpers.

use crate::errors::{OtuflowError, Result};
use flate2::read::MultiGzDecoder;
use seq_io::fasta::{Reader as FastaReader, Record as FastaRecord};
use seq_io::fastq::{Reader as FastqReader, Record as FastqRecord};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Line width used for FASTA output.
pub const FASTA_LINE_WIDTH: usize = 80;

/// Returns true if `path` starts with the gzip magic bytes.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// A plain or gzip-decoding file reader.
pub enum FileReader {
    /// Uncompressed file.
    Plain(BufReader<File>),
    /// Gzip-compressed file.
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens `path`, decompressing transparently if it is gzipped.
///
/// # Errors
///
/// Returns an error if the file cannot be opened.
pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let gzipped = is_gzipped(path)?;
    let file = BufReader::new(File::open(path)?);
    Ok(if gzipped {
        FileReader::Gzipped(MultiGzDecoder::new(file))
    } else {
        FileReader::Plain(file)
    })
}

/// Sequence file flavours the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    /// `>` headers.
    Fasta,
    /// `@` headers with qualities.
    Fastq,
}

fn sniff_format<R: BufRead>(reader: &mut R) -> io::Result<Option<SequenceFormat>> {
    loop {
        let buf = reader.fill_buf()?;
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if first.is_ascii_whitespace() {
            reader.consume(1);
            continue;
        }
        return Ok(match first {
            b'@' => Some(SequenceFormat::Fastq),
            _ => Some(SequenceFormat::Fasta),
        });
    }
}

/// Calls `visit(id, sequence)` for every record in a FASTA or FASTQ file.
///
/// The format is detected from the first non-blank byte; gzip is detected from the
/// magic bytes. An empty file yields no records. Returns the number of records read.
///
/// # Errors
///
/// Returns [`OtuflowError::Sequence`] for malformed records and propagates errors
/// returned by `visit`.
pub fn for_each_sequence<F>(path: &Path, mut visit: F) -> Result<usize>
where
    F: FnMut(&str, &[u8]) -> Result<()>,
{
    let mut reader = BufReader::new(open_reader(path)?);
    let Some(format) = sniff_format(&mut reader)? else {
        return Ok(0);
    };

    let mut count = 0;
    match format {
        SequenceFormat::Fasta => {
            let mut records = FastaReader::new(reader);
            while let Some(record) = records.next() {
                let record = record.map_err(|e| OtuflowError::sequence(path, e))?;
                let id = record.id().map_err(|e| OtuflowError::sequence(path, e))?;
                visit(id, &record.full_seq())?;
                count += 1;
            }
        }
        SequenceFormat::Fastq => {
            let mut records = FastqReader::new(reader);
            while let Some(record) = records.next() {
                let record = record.map_err(|e| OtuflowError::sequence(path, e))?;
                let id = record.id().map_err(|e| OtuflowError::sequence(path, e))?;
                visit(id, record.seq())?;
                count += 1;
            }
        }
    }
    Ok(count)
}

/// Upper-cases `sequence` and wraps it at `width` columns, without a trailing newline.
#[must_use]
pub fn format_fasta(sequence: &[u8], width: usize) -> String {
    let width = width.max(1);
    let mut out = String::with_capacity(sequence.len() + sequence.len() / width);
    for (i, chunk) in sequence.chunks(width).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.extend(chunk.iter().map(|b| char::from(b.to_ascii_uppercase())));
    }
    out
}

/// Applies the pooling length window.
///
/// Returns `None` if the sequence is shorter than `min`; otherwise the sequence cut
/// to at most `max` bases.
#[must_use]
pub fn truncate(sequence: &[u8], min: Option<usize>, max: Option<usize>) -> Option<&[u8]> {
    if min.is_some_and(|min| sequence.len() < min) {
        return None;
    }
    match max {
        Some(max) if sequence.len() > max => Some(&sequence[..max]),
        _ => Some(sequence),
    }
}

/// Builds the pooled header `>{id};barcodelabel={barcode}`.
#[must_use]
pub fn barcode_header(id: &str, barcode: &str) -> String {
    format!(">{id};barcodelabel={barcode}")
}

/// Index at which the 3' end of a read is cut.
///
/// Scans from the last base towards the first, accumulating `quality - cutoff`. Each time
/// the running sum drops below zero the cut point moves to the current base and the sum
/// resets.
#[must_use]
pub fn quality_cut_index(qualities: &[u8], offset: u8, cutoff: u8) -> usize {
    let mut cut = qualities.len();
    let mut sum: i64 = 0;
    for (i, &q) in qualities.iter().enumerate().rev() {
        sum += i64::from(q.saturating_sub(offset)) - i64::from(cutoff);
        if sum < 0 {
            cut = i;
            sum = 0;
        }
    }
    cut
}
