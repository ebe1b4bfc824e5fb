//! Lifecycle events for observability.
//!
//! The orchestrator reports run and step transitions through an
//! [`EventSink`] held by the run context.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RunEvent};
