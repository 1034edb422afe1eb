//! Monitoring events raised by the engine.
//!
//! Decorators report noteworthy conditions (a failing pipe, a slow pipe, an
//! oversized message) to an [`EventSink`]. Emission never fails and never
//! blocks processing.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Events raised by the pipe decorators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// A pipe failed.
    PipeException,
    /// A pipe took longer than its duration threshold.
    PipeLongDuration,
    /// A pipe received or produced a message above the size threshold.
    PipeMessageSizeExceeding,
}

impl MonitorEvent {
    /// Returns the event name as sent to the sink.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PipeException => "Pipe Exception",
            Self::PipeLongDuration => "Pipe Long Duration",
            Self::PipeMessageSizeExceeding => "Pipe Message Size Exceeding",
        }
    }

    /// Emits this event for a pipe.
    pub fn fire(self, sink: &dyn EventSink, pipeline: &str, pipe: &str, details: serde_json::Value) {
        sink.try_emit(
            self.name(),
            Some(serde_json::json!({
                "pipeline": pipeline,
                "pipe": pipe,
                "details": details,
            })),
        );
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(MonitorEvent::PipeException.name(), "Pipe Exception");
        assert_eq!(MonitorEvent::PipeLongDuration.to_string(), "Pipe Long Duration");
        assert_eq!(
            MonitorEvent::PipeMessageSizeExceeding.name(),
            "Pipe Message Size Exceeding"
        );
    }

    #[test]
    fn test_fire_includes_owner() {
        let sink = CollectingEventSink::new();
        MonitorEvent::PipeException.fire(&sink, "adapter", "A", serde_json::json!("boom"));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "Pipe Exception");
        let data = events[0].1.clone().unwrap();
        assert_eq!(data["pipeline"], "adapter");
        assert_eq!(data["pipe"], "A");
        assert_eq!(data["details"], "boom");
    }
}
