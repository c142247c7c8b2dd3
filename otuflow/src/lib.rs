//! # Otuflow
//!
//! A staged amplicon-sequencing pipeline engine.
//!
//! Otuflow runs an ordered queue of stages over batches of sequence files, mixing
//! in-process work with external command-line tools:
//!
//! - **Sequential orchestration**: stage outputs feed the next stage; the first failure halts
//! - **Monitored execution**: progress reporting and cooperative cancellation per stage
//! - **Config-driven commands**: external tool invocations tuned by directive files
//! - **Bounded fan-out**: per-file work spread over a worker pool with partial-failure policy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use otuflow::prelude::*;
//!
//! let settings = PipelineSettings::default().with_threads(4);
//! let mut pipeline = amplicon_pipeline(&settings, inputs)?;
//! let report = pipeline.run().await;
//! println!("{report}");
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod command;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::command::{CommandConfig, ConfigLoader, ExternalCommand};
    pub use crate::config::{MatePair, MonitorSettings, PipelineSettings, QualityEncoding};
    pub use crate::core::{StageIdentity, StageOutcome, StageResult};
    pub use crate::errors::{ConfigError, OtuflowError, Result, WrongInputCountError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{amplicon_pipeline, Pipeline, PipelineReport, PipelineState};
    pub use crate::stages::{MonitoredStage, Stage, StageState};
}

pub use errors::{OtuflowError, Result};
pub use pipeline::{Pipeline, PipelineReport};
pub use stages::Stage;
