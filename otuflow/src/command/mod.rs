//! External command construction and execution.
//!
//! - [`ExternalCommand`] assembles and runs one argv-style invocation
//! - [`CommandConfig`] and [`ConfigLoader`] populate commands from directive files

mod builder;
mod config;

pub use builder::{CommandExit, ExternalCommand};
pub use config::{parse_line, CommandConfig, ConfigLoader, Directive, ParsedLine};
