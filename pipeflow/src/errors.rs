//! Error types for the pipeflow engine.
//!
//! Configuration problems are reported once, when a pipeline is built. Run-time
//! problems are reported as [`PipeRunError`], which always carries the name of
//! the unit that failed so the exception forward, the monitoring events and the
//! adapter error message can all name it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Boxed error used as the cause of a [`PipeRunError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for pipeflow operations.
#[derive(Debug, Error)]
pub enum PipeflowError {
    /// A configuration error occurred while building a pipeline.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A pipe or pipeline failed while processing a message.
    #[error("{0}")]
    PipeRun(#[from] PipeRunError),

    /// A transaction could not be started or completed.
    #[error("{0}")]
    Transaction(#[from] TransactionError),

    /// A locker failed.
    #[error("{0}")]
    Locker(#[from] LockerError),

    /// A cache operation failed.
    #[error("{0}")]
    Cache(#[from] CacheError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Error raised when a pipeline or one of its parts is wired incorrectly.
///
/// Configuration of a pipeline continues after the first failing pipe so all
/// problems can be reported at once; later problems are kept as `suppressed`.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The component (pipe, exit, pipeline) the error is about.
    pub component: Option<String>,
    /// Errors found after this one.
    #[serde(default)]
    pub suppressed: Vec<ConfigurationError>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            component: None,
            suppressed: Vec::new(),
        }
    }

    /// Sets the component the error is about.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Merges `other` into `first`, keeping the earliest error as the primary one.
    #[must_use]
    pub fn suppress(first: Option<Self>, other: Self) -> Self {
        match first {
            None => other,
            Some(mut first) => {
                first.suppressed.push(other);
                first
            }
        }
    }

    /// Returns the total number of problems, including suppressed ones.
    #[must_use]
    pub fn problem_count(&self) -> usize {
        1 + self.suppressed.iter().map(Self::problem_count).sum::<usize>()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(ref component) = self.component {
            map.insert("component".to_string(), serde_json::json!(component));
        }
        if !self.suppressed.is_empty() {
            map.insert(
                "suppressed".to_string(),
                serde_json::Value::Array(
                    self.suppressed
                        .iter()
                        .map(|e| serde_json::json!(e.to_string()))
                        .collect(),
                ),
            );
        }
        map
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.component {
            Some(ref component) => write!(f, "Configuration error in [{component}]: {}", self.message)?,
            None => write!(f, "Configuration error: {}", self.message)?,
        }
        if !self.suppressed.is_empty() {
            write!(f, " (+{} more)", self.suppressed.len())?;
        }
        Ok(())
    }
}

/// The kind of a run-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipeRunErrorKind {
    /// The pipe itself reported a failure.
    Execution,
    /// The graph is wired in a way that only shows at run time (unknown forward).
    Configuration,
    /// Waiting for a semaphore or lock was interrupted.
    Interrupted,
    /// The transaction timeout elapsed.
    Timeout,
    /// A pipe-level lock could not be obtained.
    LockNotAcquired,
    /// A transaction could not be started or was already doomed.
    Transaction,
    /// The pipe panicked.
    Panic,
    /// Any other failure that escaped a pipe unclassified.
    Internal,
}

impl fmt::Display for PipeRunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution => write!(f, "execution"),
            Self::Configuration => write!(f, "configuration"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Timeout => write!(f, "timeout"),
            Self::LockNotAcquired => write!(f, "lock_not_acquired"),
            Self::Transaction => write!(f, "transaction"),
            Self::Panic => write!(f, "panic"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// A failure while running a pipe or a pipeline.
#[derive(Debug, Error)]
pub struct PipeRunError {
    kind: PipeRunErrorKind,
    pipe: Option<String>,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl PipeRunError {
    /// Creates a new error of the given kind.
    #[must_use]
    pub fn new(kind: PipeRunErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            pipe: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an execution failure for a pipe.
    #[must_use]
    pub fn execution(pipe: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(PipeRunErrorKind::Execution, message).with_pipe(pipe)
    }

    /// Creates a run-time configuration failure for a pipe.
    #[must_use]
    pub fn configuration(pipe: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(PipeRunErrorKind::Configuration, message).with_pipe(pipe)
    }

    /// Creates an interruption failure.
    #[must_use]
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(PipeRunErrorKind::Interrupted, message)
    }

    /// Creates an internal failure that is not tied to a pipe yet.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(PipeRunErrorKind::Internal, message)
    }

    /// Sets the failing pipe, keeping an already set one.
    #[must_use]
    pub fn with_pipe(mut self, pipe: impl Into<String>) -> Self {
        if self.pipe.is_none() {
            self.pipe = Some(pipe.into());
        }
        self
    }

    /// Sets the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Changes the kind, keeping message, pipe and cause.
    #[must_use]
    pub fn with_kind(mut self, kind: PipeRunErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the kind of failure.
    #[must_use]
    pub fn kind(&self) -> PipeRunErrorKind {
        self.kind
    }

    /// Returns the failing pipe, if known.
    #[must_use]
    pub fn pipe(&self) -> Option<&str> {
        self.pipe.as_deref()
    }

    /// Returns the message without pipe prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for failures that indicate a broken engine or graph rather
    /// than a failing message.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            PipeRunErrorKind::Configuration | PipeRunErrorKind::Panic
        )
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(ref pipe) = self.pipe {
            map.insert("pipe".to_string(), serde_json::json!(pipe));
        }
        if let Some(ref source) = self.source {
            map.insert("cause".to_string(), serde_json::json!(source.to_string()));
        }
        map
    }
}

impl fmt::Display for PipeRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref pipe) = self.pipe {
            write!(f, "Pipe [{pipe}] ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref source) = self.source {
            write!(f, ": ({source})")?;
        }
        Ok(())
    }
}

impl From<TransactionError> for PipeRunError {
    fn from(err: TransactionError) -> Self {
        Self::new(PipeRunErrorKind::Transaction, "transaction failure").with_source(err)
    }
}

/// Errors raised by transaction demarcation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// MANDATORY propagation without an ambient transaction.
    #[error("No existing transaction found for transaction marked with propagation 'mandatory'")]
    NoTransaction,

    /// NEVER propagation with an ambient transaction.
    #[error("Existing transaction found for transaction marked with propagation 'never'")]
    ExistingTransaction,

    /// The ambient transaction is already marked rollback-only.
    #[error("Transaction [{name}] is already marked rollback-only")]
    RollbackOnly {
        /// Name of the doomed transaction.
        name: String,
    },

    /// The resource manager rejected begin, commit or rollback.
    #[error("Transaction resource failure: {0}")]
    Resource(String),
}

/// Errors raised by lockers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockerError {
    /// Waiting for the lock was interrupted.
    #[error("Interrupted while acquiring lock [{object_id}]")]
    Interrupted {
        /// The lock name.
        object_id: String,
    },

    /// The lock token passed to release is not held.
    #[error("Lock [{object_id}] is not held by token [{token}]")]
    NotHeld {
        /// The lock name.
        object_id: String,
        /// The token presented.
        token: String,
    },

    /// Backend failure.
    #[error("Locker [{object_id}] failure: {reason}")]
    Backend {
        /// The lock name.
        object_id: String,
        /// The reason for failure.
        reason: String,
    },
}

/// Errors raised by caches.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The cache is not open.
    #[error("Cache [{0}] is not open")]
    NotOpen(String),

    /// Backend failure.
    #[error("Cache [{name}] failure: {reason}")]
    Backend {
        /// The cache name.
        name: String,
        /// The reason for failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::new("no pipe found for firstPipe [x]").with_component("PipeLine of [a]");
        assert_eq!(
            err.to_string(),
            "Configuration error in [PipeLine of [a]]: no pipe found for firstPipe [x]"
        );
    }

    #[test]
    fn test_configuration_error_suppression() {
        let first = ConfigurationError::new("first");
        let merged = ConfigurationError::suppress(Some(first), ConfigurationError::new("second"));
        let merged = ConfigurationError::suppress(Some(merged), ConfigurationError::new("third"));

        assert_eq!(merged.message, "first");
        assert_eq!(merged.problem_count(), 3);
        assert!(merged.to_string().ends_with("(+2 more)"));

        let only = ConfigurationError::suppress(None, ConfigurationError::new("only"));
        assert_eq!(only.message, "only");
    }

    #[test]
    fn test_pipe_run_error_keeps_first_pipe() {
        let err = PipeRunError::execution("inner", "boom").with_pipe("outer");
        assert_eq!(err.pipe(), Some("inner"));
        assert_eq!(err.to_string(), "Pipe [inner] boom");
    }

    #[test]
    fn test_pipe_run_error_fatality() {
        assert!(PipeRunError::configuration("p", "unknown forward").is_fatal());
        assert!(PipeRunError::new(PipeRunErrorKind::Panic, "panicked").is_fatal());
        assert!(!PipeRunError::execution("p", "boom").is_fatal());
        assert!(!PipeRunError::interrupted("stop").is_fatal());
    }

    #[test]
    fn test_pipe_run_error_to_dict() {
        let err = PipeRunError::execution("p", "boom").with_source(TransactionError::NoTransaction);
        let dict = err.to_dict();

        assert_eq!(dict.get("kind").unwrap(), "execution");
        assert_eq!(dict.get("pipe").unwrap(), "p");
        assert!(dict.contains_key("cause"));
    }

    #[test]
    fn test_transaction_error_conversion() {
        let err: PipeRunError = TransactionError::RollbackOnly { name: "tx".to_string() }.into();
        assert_eq!(err.kind(), PipeRunErrorKind::Transaction);
        assert!(err.to_string().contains("rollback-only"));
    }
}
