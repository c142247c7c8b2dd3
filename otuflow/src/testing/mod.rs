//! Testing utilities for otuflow pipelines.
//!
//! Mock stages with scripted results, a launch log for asserting which inputs a
//! stage received, and helpers that stand up fake external tools.

mod mocks;
mod tools;

pub use mocks::{ErroringStage, FailingStage, LaunchLog, ScriptedStage, SlowStage};
#[cfg(unix)]
pub use tools::write_script;
pub use tools::write_tool_config;
