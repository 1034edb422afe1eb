//! Collaborators shared by every pipeline of an engine.

use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::events::{EventSink, LoggingEventSink};
use crate::formatting::{ErrorMessageFormatter, JsonErrorMessageFormatter};
use crate::observability::{InMemoryStatistics, StatisticsSink};
use crate::resources::{LimiterRegistry, LocalTransactionManager, TransactionManager};

/// Engine-wide services handed to every decorator.
#[derive(Clone)]
pub struct EngineServices {
    /// Engine configuration.
    pub config: EngineConfig,
    /// Receiver of monitoring events.
    pub events: Arc<dyn EventSink>,
    /// Receiver of measurements.
    pub statistics: Arc<dyn StatisticsSink>,
    /// Concurrency limiters keyed by owner.
    pub limiters: Arc<LimiterRegistry>,
    /// Transaction manager used for pipes and pipelines that demarcate transactions.
    pub transaction_manager: Arc<dyn TransactionManager>,
    /// Renders failures routed to an exception forward or returned by an adapter.
    pub error_formatter: Arc<dyn ErrorMessageFormatter>,
}

impl Default for EngineServices {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EngineServices {
    /// Creates services with in-memory defaults.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            events: Arc::new(LoggingEventSink::default()),
            statistics: Arc::new(InMemoryStatistics::new()),
            limiters: Arc::new(LimiterRegistry::new()),
            transaction_manager: Arc::new(LocalTransactionManager::new()),
            error_formatter: Arc::new(JsonErrorMessageFormatter::default()),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the statistics sink.
    #[must_use]
    pub fn with_statistics(mut self, statistics: Arc<dyn StatisticsSink>) -> Self {
        self.statistics = statistics;
        self
    }

    /// Replaces the limiter registry.
    #[must_use]
    pub fn with_limiters(mut self, limiters: Arc<LimiterRegistry>) -> Self {
        self.limiters = limiters;
        self
    }

    /// Replaces the transaction manager.
    #[must_use]
    pub fn with_transaction_manager(mut self, manager: Arc<dyn TransactionManager>) -> Self {
        self.transaction_manager = manager;
        self
    }

    /// Replaces the error message formatter.
    #[must_use]
    pub fn with_error_formatter(mut self, formatter: Arc<dyn ErrorMessageFormatter>) -> Self {
        self.error_formatter = formatter;
        self
    }
}

impl fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineServices")
            .field("config", &self.config)
            .field("statistics", &self.statistics)
            .field("limiters", &self.limiters.len())
            .field("transaction_manager", &self.transaction_manager)
            .field("error_formatter", &self.error_formatter)
            .finish_non_exhaustive()
    }
}
