//! Event sinks for observability.
//!
//! The orchestrator and the stage monitor report lifecycle events through an
//! [`EventSink`] passed in explicitly; there is no global sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
