//! Test fixtures for pipeline testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::PipeLineSession;
use crate::errors::{LockerError, TransactionError};
use crate::events::CollectingEventSink;
use crate::observability::InMemoryStatistics;
use crate::pipeline::{Adapter, PipeLine};
use crate::resources::{
    LockToken, Locker, TransactionDefinition, TransactionHandle, TransactionManager,
};
use crate::services::EngineServices;

/// What happened to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    /// The transaction was begun.
    Begin,
    /// The transaction was committed.
    Commit,
    /// The transaction was rolled back.
    Rollback,
}

/// One recorded transaction event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Owner name of the transaction.
    pub name: String,
    /// What happened.
    pub event: TransactionEvent,
    /// Whether the transaction was marked rollback-only at that moment.
    pub rollback_only: bool,
}

/// A transaction manager that records every call.
#[derive(Debug, Default)]
pub struct RecordingTransactionManager {
    records: Mutex<Vec<TransactionRecord>>,
}

impl RecordingTransactionManager {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all records in call order.
    #[must_use]
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.lock().clone()
    }

    /// Returns the records of one event type.
    #[must_use]
    pub fn records_of(&self, event: TransactionEvent) -> Vec<TransactionRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.event == event)
            .cloned()
            .collect()
    }

    fn record(&self, name: &str, event: TransactionEvent, rollback_only: bool) {
        self.records.lock().push(TransactionRecord {
            name: name.to_string(),
            event,
            rollback_only,
        });
    }
}

#[async_trait]
impl TransactionManager for RecordingTransactionManager {
    async fn begin(&self, definition: &TransactionDefinition) -> Result<TransactionHandle, TransactionError> {
        self.record(definition.name(), TransactionEvent::Begin, false);
        Ok(TransactionHandle::new(definition.name()))
    }

    async fn commit(&self, transaction: &TransactionHandle) -> Result<(), TransactionError> {
        self.record(transaction.name(), TransactionEvent::Commit, transaction.is_rollback_only());
        Ok(())
    }

    async fn rollback(&self, transaction: &TransactionHandle) -> Result<(), TransactionError> {
        self.record(transaction.name(), TransactionEvent::Rollback, transaction.is_rollback_only());
        Ok(())
    }
}

/// A locker that never hands out the lock.
#[derive(Debug)]
pub struct FailingLocker {
    object_id: String,
    error: Option<LockerError>,
    attempts: AtomicUsize,
}

impl FailingLocker {
    /// Creates a locker whose lock is always taken.
    #[must_use]
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            error: None,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Fails acquisition with `error` instead.
    #[must_use]
    pub fn with_error(mut self, error: LockerError) -> Self {
        self.error = Some(error);
        self
    }

    /// Returns the number of acquisition attempts.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Locker for FailingLocker {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    async fn acquire(&self, _session: &PipeLineSession) -> Result<Option<LockToken>, LockerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(None),
        }
    }

    async fn release(&self, token: LockToken) -> Result<(), LockerError> {
        Err(LockerError::NotHeld {
            object_id: token.object_id().to_string(),
            token: token.token().to_string(),
        })
    }
}

/// Engine services wired to in-memory recorders.
#[derive(Debug, Clone)]
pub struct TestFixture {
    /// The services handed to adapters.
    pub services: Arc<EngineServices>,
    /// Collected monitoring events.
    pub events: Arc<CollectingEventSink>,
    /// Recorded measurements.
    pub statistics: Arc<InMemoryStatistics>,
    /// Recorded transactions.
    pub transactions: Arc<RecordingTransactionManager>,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// Creates a fixture with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates a fixture with the given configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let events = Arc::new(CollectingEventSink::new());
        let statistics = Arc::new(InMemoryStatistics::new());
        let transactions = Arc::new(RecordingTransactionManager::new());
        let services = Arc::new(
            EngineServices::new(config)
                .with_events(events.clone())
                .with_statistics(statistics.clone())
                .with_transaction_manager(transactions.clone()),
        );
        Self {
            services,
            events,
            statistics,
            transactions,
        }
    }

    /// Creates an adapter for `pipeline` on these services.
    #[must_use]
    pub fn adapter(&self, pipeline: PipeLine) -> Adapter {
        Adapter::new(pipeline, Arc::clone(&self.services))
    }
}
