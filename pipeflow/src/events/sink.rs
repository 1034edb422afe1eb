//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Receiver of monitoring events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    ///
    /// * `event` - The event name (e.g., "Pipe Exception")
    /// * `data` - Optional event data
    async fn emit(&self, event: &str, data: Option<serde_json::Value>);

    /// Emits an event without blocking. Must never fail.
    fn try_emit(&self, event: &str, data: Option<serde_json::Value>);
}

/// An event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event: &str, _data: Option<serde_json::Value>) {}
}

/// An event sink that writes events to the log.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::WARN }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log_event(&self, event: &str, data: Option<&serde_json::Value>) {
        match self.level {
            Level::TRACE | Level::DEBUG => debug!(event = %event, event_data = ?data, "monitoring event"),
            Level::INFO => info!(event = %event, event_data = ?data, "monitoring event"),
            _ => warn!(event = %event, event_data = ?data, "monitoring event"),
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &str, data: Option<serde_json::Value>) {
        self.log_event(event, data.as_ref());
    }

    fn try_emit(&self, event: &str, data: Option<serde_json::Value>) {
        self.log_event(event, data.as_ref());
    }
}

/// An event sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<serde_json::Value>)> {
        self.events.read().clone()
    }

    /// Returns the data of every event with the given name.
    #[must_use]
    pub fn events_named(&self, event: &str) -> Vec<Option<serde_json::Value>> {
        self.events
            .read()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Returns the number of events with the given name.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.events.read().iter().filter(|(name, _)| name == event).count()
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

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &str, data: Option<serde_json::Value>) {
        self.try_emit(event, data);
    }

    fn try_emit(&self, event: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit("Pipe Exception", None).await;
        sink.try_emit("Pipe Exception", Some(serde_json::json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_logging_sink_levels() {
        for level in [Level::DEBUG, Level::INFO, Level::WARN] {
            let sink = LoggingEventSink::new(level);
            sink.emit("Pipe Long Duration", Some(serde_json::json!({"ms": 5}))).await;
            sink.try_emit("Pipe Long Duration", None);
        }
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("Pipe Exception", None).await;
        sink.try_emit("Pipe Long Duration", Some(serde_json::json!({"ms": 12})));
        sink.try_emit("Pipe Exception", Some(serde_json::json!({"pipe": "B"})));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count("Pipe Exception"), 2);
        assert_eq!(sink.events_named("Pipe Long Duration"), vec![Some(serde_json::json!({"ms": 12}))]);

        sink.clear();
        assert!(sink.is_empty());
    }
}
