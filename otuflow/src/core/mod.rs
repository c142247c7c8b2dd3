//! Core domain model types for otuflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage identity tags
//! - Stage outcome enum
//! - Stage result with warning and fail message sets

mod identity;
mod result;
mod status;

pub use identity::StageIdentity;
pub use result::{MessageSet, StageResult};
pub use status::StageOutcome;
