//! File and sequence helpers shared by the concrete stages.

pub mod files;
pub mod sequence;

pub use files::{collect_inputs, file_name};
pub use sequence::{
    barcode_header, for_each_sequence, format_fasta, is_gzipped, open_reader, quality_cut_index,
    truncate, FileReader, SequenceFormat, FASTA_LINE_WIDTH,
};
