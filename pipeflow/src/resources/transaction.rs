//! Transaction demarcation.
//!
//! The engine decides, per pipe and per pipeline, whether to join the ambient
//! transaction of the session, start a new one, suspend it, or refuse to run.
//! The [`TransactionManager`] only begins, commits and rolls back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::PipeLineSession;
use crate::errors::{PipeRunError, PipeRunErrorKind, TransactionError};
use crate::utils::generate_uuid;

/// How a unit of work relates to the ambient transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the ambient transaction, or start one.
    Required,
    /// Join the ambient transaction if there is one.
    #[default]
    Supports,
    /// Join the ambient transaction; fail if there is none.
    Mandatory,
    /// Always start a new transaction, suspending the ambient one.
    RequiresNew,
    /// Run without transaction, suspending the ambient one.
    NotSupported,
    /// Run without transaction; fail if there is one.
    Never,
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Required => "REQUIRED",
            Self::Supports => "SUPPORTS",
            Self::Mandatory => "MANDATORY",
            Self::RequiresNew => "REQUIRES_NEW",
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Never => "NEVER",
        };
        f.write_str(name)
    }
}

impl FromStr for Propagation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "REQUIRED" => Ok(Self::Required),
            "SUPPORTS" => Ok(Self::Supports),
            "MANDATORY" => Ok(Self::Mandatory),
            "REQUIRESNEW" | "REQUIRES_NEW" => Ok(Self::RequiresNew),
            "NOTSUPPORTED" | "NOT_SUPPORTED" => Ok(Self::NotSupported),
            "NEVER" => Ok(Self::Never),
            other => Err(format!("unknown transaction attribute [{other}]")),
        }
    }
}

/// Transaction settings of a pipe or pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDefinition {
    name: String,
    propagation: Propagation,
    timeout: Option<Duration>,
}

impl TransactionDefinition {
    /// Creates a definition.
    #[must_use]
    pub fn new(name: impl Into<String>, propagation: Propagation, timeout: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            propagation,
            timeout: timeout.filter(|t| !t.is_zero()),
        }
    }

    /// Returns the name of the owner.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the propagation.
    #[must_use]
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Returns the timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

struct TransactionState {
    id: String,
    name: String,
    rollback_only: AtomicBool,
    started: Instant,
}

/// A running transaction. Clones refer to the same transaction.
#[derive(Clone)]
pub struct TransactionHandle(Arc<TransactionState>);

impl TransactionHandle {
    /// Creates a handle for a freshly begun transaction.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(TransactionState {
            id: generate_uuid().to_string(),
            name: name.into(),
            rollback_only: AtomicBool::new(false),
            started: Instant::now(),
        }))
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Returns the name of the unit that started the transaction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Marks the transaction so that it can only be rolled back.
    pub fn set_rollback_only(&self) {
        self.0.rollback_only.store(true, Ordering::SeqCst);
    }

    /// Returns true if the transaction can only be rolled back.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.0.rollback_only.load(Ordering::SeqCst)
    }

    /// Returns how long the transaction has been running.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.0.started.elapsed()
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("rollback_only", &self.is_rollback_only())
            .finish()
    }
}

/// A transactional resource manager.
#[async_trait]
pub trait TransactionManager: Send + Sync + fmt::Debug {
    /// Begins a new transaction.
    async fn begin(&self, definition: &TransactionDefinition) -> Result<TransactionHandle, TransactionError>;

    /// Commits a transaction.
    async fn commit(&self, transaction: &TransactionHandle) -> Result<(), TransactionError>;

    /// Rolls a transaction back.
    async fn rollback(&self, transaction: &TransactionHandle) -> Result<(), TransactionError>;
}

/// A transaction manager without external resources. It counts outcomes.
#[derive(Debug, Default)]
pub struct LocalTransactionManager {
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

impl LocalTransactionManager {
    /// Creates a manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of begun transactions.
    #[must_use]
    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    /// Returns the number of committed transactions.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    /// Returns the number of rolled back transactions.
    #[must_use]
    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionManager for LocalTransactionManager {
    async fn begin(&self, definition: &TransactionDefinition) -> Result<TransactionHandle, TransactionError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        let handle = TransactionHandle::new(definition.name());
        debug!(transaction = %handle.id(), owner = %definition.name(), "transaction begun");
        Ok(handle)
    }

    async fn commit(&self, transaction: &TransactionHandle) -> Result<(), TransactionError> {
        if transaction.is_rollback_only() {
            return Err(TransactionError::RollbackOnly {
                name: transaction.name().to_string(),
            });
        }
        self.committed.fetch_add(1, Ordering::SeqCst);
        debug!(transaction = %transaction.id(), "transaction committed");
        Ok(())
    }

    async fn rollback(&self, transaction: &TransactionHandle) -> Result<(), TransactionError> {
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        debug!(transaction = %transaction.id(), "transaction rolled back");
        Ok(())
    }
}

#[derive(Debug)]
enum ScopeKind {
    /// A transaction started by this scope.
    New(TransactionHandle),
    /// The ambient transaction, joined.
    Joined(TransactionHandle),
    /// The ambient transaction was suspended.
    Suspended,
    /// No transaction involved.
    None,
}

/// The transactional context of one pipe or pipeline invocation.
///
/// Obtained with [`TransactionScope::begin`] and finished with
/// [`TransactionScope::complete`]. Completing a scope also rolls back every
/// transaction that nested work began but never completed, which happens when
/// a timeout cancels that work. A scope dropped without completion marks its
/// own transaction rollback-only, so the enclosing scope rolls it back.
#[derive(Debug)]
pub struct TransactionScope {
    kind: ScopeKind,
    depth: usize,
    local_rollback_only: AtomicBool,
    completed: bool,
}

impl TransactionScope {
    /// Fails if the ambient transaction is already marked rollback-only.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::RollbackOnly`] if the transaction is doomed.
    pub fn ensure_not_rollback_only(session: &PipeLineSession) -> Result<(), TransactionError> {
        match session.current_transaction() {
            Some(tx) if tx.is_rollback_only() => Err(TransactionError::RollbackOnly {
                name: tx.name().to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Applies `definition` to the session's ambient transaction.
    ///
    /// # Errors
    ///
    /// Fails for MANDATORY without and NEVER with an ambient transaction, or
    /// when the manager cannot begin a transaction.
    pub async fn begin(
        manager: &dyn TransactionManager,
        definition: &TransactionDefinition,
        session: &mut PipeLineSession,
    ) -> Result<Self, TransactionError> {
        let depth = session.transaction_depth();
        let existing = session.current_transaction().cloned();
        let kind = match (definition.propagation(), existing) {
            (Propagation::Required | Propagation::Supports | Propagation::Mandatory, Some(tx)) => {
                ScopeKind::Joined(tx)
            }
            (Propagation::Required | Propagation::RequiresNew, _) => {
                let tx = manager.begin(definition).await?;
                session.push_transaction(Some(tx.clone()));
                ScopeKind::New(tx)
            }
            (Propagation::Mandatory, None) => return Err(TransactionError::NoTransaction),
            (Propagation::Never, Some(_)) => return Err(TransactionError::ExistingTransaction),
            (Propagation::NotSupported, Some(_)) => {
                session.push_transaction(None);
                ScopeKind::Suspended
            }
            (Propagation::Supports | Propagation::NotSupported | Propagation::Never, None) => ScopeKind::None,
        };
        Ok(Self {
            kind,
            depth,
            local_rollback_only: AtomicBool::new(false),
            completed: false,
        })
    }

    /// Returns true if this scope started its own transaction.
    #[must_use]
    pub fn is_new_transaction(&self) -> bool {
        matches!(self.kind, ScopeKind::New(_))
    }

    /// Returns the transaction this scope runs in.
    #[must_use]
    pub fn transaction(&self) -> Option<&TransactionHandle> {
        match &self.kind {
            ScopeKind::New(tx) | ScopeKind::Joined(tx) => Some(tx),
            ScopeKind::Suspended | ScopeKind::None => None,
        }
    }

    /// Marks the work of this scope as failed.
    pub fn set_rollback_only(&self) {
        match &self.kind {
            ScopeKind::New(tx) | ScopeKind::Joined(tx) => tx.set_rollback_only(),
            ScopeKind::Suspended | ScopeKind::None => {
                self.local_rollback_only.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Returns true if the work of this scope was marked as failed.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.transaction()
            .map_or_else(|| self.local_rollback_only.load(Ordering::SeqCst), TransactionHandle::is_rollback_only)
    }

    /// Finishes the scope: commits or rolls back a transaction this scope
    /// started, and resumes a suspended one.
    ///
    /// # Errors
    ///
    /// Returns the manager's error if commit or rollback fails.
    pub async fn complete(
        mut self,
        manager: &dyn TransactionManager,
        session: &mut PipeLineSession,
    ) -> Result<(), TransactionError> {
        self.completed = true;
        let own_entries = usize::from(matches!(self.kind, ScopeKind::New(_) | ScopeKind::Suspended));
        for tx in session
            .unwind_transactions(self.depth + own_entries)
            .into_iter()
            .flatten()
        {
            warn!(transaction = %tx.id(), owner = %tx.name(), "rolling back transaction left open by cancelled work");
            tx.set_rollback_only();
            if let Err(err) = manager.rollback(&tx).await {
                warn!(transaction = %tx.id(), error = %err, "could not roll back abandoned transaction");
            }
        }

        match &self.kind {
            ScopeKind::New(tx) => {
                session.unwind_transactions(self.depth);
                if tx.is_rollback_only() {
                    manager.rollback(tx).await
                } else {
                    manager.commit(tx).await
                }
            }
            ScopeKind::Suspended => {
                session.unwind_transactions(self.depth);
                Ok(())
            }
            ScopeKind::Joined(_) | ScopeKind::None => Ok(()),
        }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let ScopeKind::New(tx) = &self.kind {
            tx.set_rollback_only();
            warn!(transaction = %tx.id(), owner = %tx.name(), "transaction scope dropped before completion");
        }
    }
}

/// Runs work under a deadline.
///
/// When the deadline passes the work is cancelled and a `Timeout` failure is
/// returned. A failure of the work itself takes precedence over an elapsed
/// deadline.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    description: String,
    timeout: Option<Duration>,
}

impl TimeoutGuard {
    /// Creates a guard. A missing or zero timeout disables the guard.
    #[must_use]
    pub fn new(description: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            description: description.into(),
            timeout: timeout.filter(|t| !t.is_zero()),
        }
    }

    /// Runs `work` under the deadline.
    ///
    /// # Errors
    ///
    /// Returns the work's own error, or a `Timeout` error if the deadline passed.
    pub async fn run<T, F>(&self, work: F) -> Result<T, PipeRunError>
    where
        F: Future<Output = Result<T, PipeRunError>>,
    {
        let Some(timeout) = self.timeout else {
            return work.await;
        };

        let started = Instant::now();
        match tokio::time::timeout(timeout, work).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if started.elapsed() >= timeout {
                    warn!(
                        guard = %self.description,
                        error = %err,
                        "timeout elapsed, but propagating other caught error"
                    );
                }
                Err(err)
            }
            Err(elapsed) => Err(PipeRunError::new(
                PipeRunErrorKind::Timeout,
                format!(
                    "{} was interrupted after timeout of [{}] ms",
                    self.description,
                    timeout.as_millis()
                ),
            )
            .with_source(elapsed)),
        }
    }
}
