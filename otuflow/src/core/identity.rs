//! Stage identity tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline phase a stage implements.
///
/// The orchestrator keeps at most one stage per identity; registering a second
/// stage with the same identity replaces the first in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageIdentity {
    /// Pools many FASTA files into a single labelled file.
    Pooling,
    /// Trims low-quality 3' ends of FASTQ reads.
    Trimming,
    /// Collapses identical sequences.
    Dereplication,
    /// Assembles paired-end mates.
    Assembly,
    /// Clusters dereplicated sequences into OTUs.
    OtuClustering,
    /// Maps reads back onto OTUs.
    Mapping,
    /// Builds the OTU count table.
    Tabling,
}

impl StageIdentity {
    /// All identities in canonical pipeline order.
    pub const ALL: [Self; 7] = [
        Self::Assembly,
        Self::Pooling,
        Self::Trimming,
        Self::Dereplication,
        Self::OtuClustering,
        Self::Mapping,
        Self::Tabling,
    ];

    /// Human readable label used in progress output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pooling => "Pooling",
            Self::Trimming => "Quality trimming",
            Self::Dereplication => "Dereplication",
            Self::Assembly => "Assembling",
            Self::OtuClustering => "OTU clustering",
            Self::Mapping => "Read mapping",
            Self::Tabling => "OTU tabling",
        }
    }

    /// Default output subdirectory name.
    #[must_use]
    pub const fn default_subdir(self) -> &'static str {
        match self {
            Self::Pooling => "pooled",
            Self::Trimming => "trimmed",
            Self::Dereplication => "dereplicated",
            Self::Assembly => "assembled",
            Self::OtuClustering => "clustered",
            Self::Mapping => "mapped",
            Self::Tabling => "table",
        }
    }
}

impl fmt::Display for StageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
