//! Event sink trait and implementations.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Level};

/// A lifecycle event emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Event type (e.g., "step.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Run the event belongs to.
    pub run_id: String,
    /// Step the event concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Ordinal of that step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<usize>,
    /// When the event occurred (ISO 8601).
    pub timestamp: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RunEvent {
    /// Creates a run-level event.
    #[must_use]
    pub fn new(event_type: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            run_id: run_id.into(),
            step_id: None,
            ordinal: None,
            timestamp: crate::utils::iso_timestamp(),
            data: serde_json::Value::Null,
        }
    }

    /// Attributes the event to a step.
    #[must_use]
    pub fn for_step(mut self, step_id: impl Into<String>, ordinal: usize) -> Self {
        self.step_id = Some(step_id.into());
        self.ordinal = Some(ordinal);
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Returns true for failure events.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.event_type.ends_with(".failed") || self.event_type.ends_with(".aborted")
    }
}

/// Receives run and step lifecycle events.
///
/// Emission must never fail the run: implementations swallow their own errors.
pub trait EventSink: Send + Sync {
    /// Emits one event.
    fn emit(&self, event: &RunEvent);
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &RunEvent) {}
}

/// An event sink that mirrors events into `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &RunEvent) {
        let step = event.step_id.as_deref().unwrap_or("-");
        if event.is_failure() {
            warn!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                step = %step,
                data = %event.data,
                "Event: {}", event.event_type
            );
        } else if self.level == Level::DEBUG {
            debug!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                step = %step,
                data = %event.data,
                "Event: {}", event.event_type
            );
        } else {
            info!(
                event_type = %event.event_type,
                run_id = %event.run_id,
                step = %step,
                "Event: {}", event.event_type
            );
        }
    }
}

/// A collecting event sink for tests and dry runs.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
    }

    /// Returns the collected event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &RunEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_and_logging_sinks_do_not_panic() {
        let event = RunEvent::new("run.started", "r1");
        NoOpEventSink.emit(&event);
        LoggingEventSink::default().emit(&event);
        LoggingEventSink::debug().emit(&event.clone().for_step("discovery", 1));
        LoggingEventSink::default().emit(&RunEvent::new("run.aborted", "r1"));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&RunEvent::new("run.started", "r1"));
        sink.emit(
            &RunEvent::new("step.completed", "r1")
                .for_step("discovery", 1)
                .with_data(serde_json::json!({"records": 3})),
        );

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.event_types(), vec!["run.started", "step.completed"]);
        let steps = sink.events_of_type("step.");
        assert_eq!(steps[0].step_id.as_deref(), Some("discovery"));
        assert_eq!(steps[0].data["records"], 3);
    }

    #[test]
    fn test_failure_detection() {
        assert!(RunEvent::new("step.failed", "r").is_failure());
        assert!(RunEvent::new("run.aborted", "r").is_failure());
        assert!(!RunEvent::new("step.skipped", "r").is_failure());
    }

    #[test]
    fn test_event_serialization_omits_missing_step() {
        let json = serde_json::to_value(RunEvent::new("run.started", "r1")).unwrap();
        assert_eq!(json["type"], "run.started");
        assert!(json.get("step_id").is_none());
    }
}
