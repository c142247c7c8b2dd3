//! Pipeline orchestration.
//!
//! This module provides:
//! - The sequential [`Pipeline`] orchestrator and its run reports
//! - The default amplicon stage queue in [`preset`]

mod orchestrator;
pub mod preset;


pub use orchestrator::{
    Pipeline, PipelineReport, PipelineState, StageReport, OUTPUT_FOLDER,
};
pub use preset::amplicon_pipeline;
