//! Run configuration.
//!
//! Settings deserialize from JSON with every field optional; missing fields take the
//! defaults below. The CLI layers its flags on top with the `with_*` methods.

use crate::errors::{OtuflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Quality score offset used by FASTQ inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityEncoding {
    /// Sanger / Illumina 1.8+, offset 33.
    #[default]
    Phred33,
    /// Illumina 1.3 to 1.7, offset 64.
    Phred64,
}

impl QualityEncoding {
    /// ASCII offset of quality score zero.
    #[must_use]
    pub const fn offset(self) -> u8 {
        match self {
            Self::Phred33 => 33,
            Self::Phred64 => 64,
        }
    }
}

/// Forward and reverse mate tokens used to pair read files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatePair {
    /// Substring identifying forward read files.
    pub forward: String,
    /// Substring identifying reverse read files.
    pub reverse: String,
}

impl MatePair {
    /// Creates a mate pair.
    #[must_use]
    pub fn new(forward: impl Into<String>, reverse: impl Into<String>) -> Self {
        Self {
            forward: forward.into(),
            reverse: reverse.into(),
        }
    }
}

/// Settings for the progress monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long to wait for an interrupted stage to return, in milliseconds.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Whether to draw the progress spinner.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_grace_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            grace_ms: default_grace_ms(),
            show_progress: true,
        }
    }
}

impl MonitorSettings {
    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        self
    }

    /// Sets the grace period.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables the spinner.
    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// The poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// The grace period as a duration.
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Settings for a full amplicon run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Worker pool size for fan-out stages.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Minimum abundance kept by dereplication.
    #[serde(default = "default_min_size")]
    pub min_size: u64,
    /// Sequences shorter than this are dropped while pooling.
    #[serde(default)]
    pub trunc_min: Option<usize>,
    /// Sequences longer than this are truncated while pooling.
    #[serde(default)]
    pub trunc_max: Option<usize>,
    /// Quality cutoff for 3' trimming. Trimming is skipped when unset.
    #[serde(default)]
    pub trim_cutoff: Option<u8>,
    /// Mate tokens. Assembly runs only when set.
    #[serde(default)]
    pub mates: Option<MatePair>,
    /// FASTQ quality encoding.
    #[serde(default)]
    pub encoding: QualityEncoding,
    /// Directory holding `<tool>.config` files.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Parent directory of the output folder.
    #[serde(default = "default_output_parent")]
    pub output_parent: PathBuf,
    /// Monitor behaviour.
    #[serde(default)]
    pub monitor: MonitorSettings,
}

fn default_threads() -> usize {
    1
}

fn default_min_size() -> u64 {
    1
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("config")
}

fn default_output_parent() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            min_size: default_min_size(),
            trunc_min: None,
            trunc_max: None,
            trim_cutoff: None,
            mates: None,
            encoding: QualityEncoding::default(),
            config_dir: default_config_dir(),
            output_parent: default_output_parent(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl PipelineSettings {
    /// Reads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| OtuflowError::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Sets the worker pool size. Zero is treated as one.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Sets the dereplication threshold.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Sets the pooling length window.
    #[must_use]
    pub fn with_truncation(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.trunc_min = min;
        self.trunc_max = max;
        self
    }

    /// Enables quality trimming with `cutoff`.
    #[must_use]
    pub fn with_trim_cutoff(mut self, cutoff: u8) -> Self {
        self.trim_cutoff = Some(cutoff);
        self
    }

    /// Enables assembly with the given mate tokens.
    #[must_use]
    pub fn with_mates(mut self, mates: MatePair) -> Self {
        self.mates = Some(mates);
        self
    }

    /// Sets the quality encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: QualityEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the tool configuration directory.
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Sets the output parent directory.
    #[must_use]
    pub fn with_output_parent(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_parent = dir.into();
        self
    }

    /// Replaces the monitor settings.
    #[must_use]
    pub fn with_monitor(mut self, monitor: MonitorSettings) -> Self {
        self.monitor = monitor;
        self
    }
}
