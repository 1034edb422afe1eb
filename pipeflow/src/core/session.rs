//! Per-invocation session.
//!
//! A [`PipeLineSession`] is created for every message an adapter processes.
//! Pipes use it to pass values to each other; the engine uses it for the
//! message id, the receipt time, the original input, the exit state and the
//! ambient transaction.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use super::message::Message;
use super::trace::TraceContext;
use crate::resources::TransactionHandle;

/// Session key of the message id.
pub const MESSAGE_ID_KEY: &str = "mid";
/// Session key of the correlation id.
pub const CORRELATION_ID_KEY: &str = "cid";
/// Session key of the time the message was received.
pub const TS_RECEIVED_KEY: &str = "tsReceived";
/// Session key of the message as it entered the pipeline.
pub const ORIGINAL_MESSAGE_KEY: &str = "originalMessage";
/// Session key of the exit state of the pipeline.
pub const EXIT_STATE_KEY: &str = "exitState";
/// Session key of the exit code of the pipeline.
pub const EXIT_CODE_KEY: &str = "exitCode";

/// A value stored in a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    /// A message, as stored by pipes.
    Message(Message),
    /// A plain JSON value.
    Value(serde_json::Value),
    /// A point in time.
    Timestamp(DateTime<Utc>),
}

impl SessionValue {
    /// Returns the value as a message. JSON strings become text messages,
    /// JSON null becomes a null message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        match self {
            Self::Message(m) => m.clone(),
            Self::Value(serde_json::Value::Null) => Message::null(),
            Self::Value(serde_json::Value::String(s)) => Message::text(s.clone()),
            Self::Value(v) => Message::text(v.to_string()),
            Self::Timestamp(ts) => Message::text(ts.to_rfc3339()),
        }
    }

    /// Returns the value rendered as a string, `None` for null.
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        self.to_message().as_string()
    }
}

impl From<Message> for SessionValue {
    fn from(value: Message) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for SessionValue {
    fn from(value: &str) -> Self {
        Self::Value(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for SessionValue {
    fn from(value: String) -> Self {
        Self::Value(serde_json::Value::String(value))
    }
}

impl From<serde_json::Value> for SessionValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

impl From<i32> for SessionValue {
    fn from(value: i32) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for SessionValue {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

impl From<DateTime<Utc>> for SessionValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

type CloseAction = Box<dyn FnOnce() + Send>;

/// Mutable key/value context of one pipeline invocation.
///
/// Resources registered with [`register_closeable`](Self::register_closeable)
/// are released in reverse order of registration when the session is closed
/// or dropped.
pub struct PipeLineSession {
    values: HashMap<String, SessionValue>,
    closeables: Mutex<Vec<(String, CloseAction)>>,
    transactions: Vec<Option<TransactionHandle>>,
    trace: TraceContext,
}

impl PipeLineSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            closeables: Mutex::new(Vec::new()),
            transactions: Vec::new(),
            trace: TraceContext::new(),
        }
    }

    /// Creates a session carrying the given message id.
    #[must_use]
    pub fn with_message_id(message_id: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.insert(MESSAGE_ID_KEY, message_id.into());
        session
    }

    /// Stores a value, replacing any previous value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SessionValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.values.get(key)
    }

    /// Returns the value stored under `key` as a message.
    #[must_use]
    pub fn get_message(&self, key: &str) -> Option<Message> {
        self.values.get(key).map(SessionValue::to_message)
    }

    /// Returns the value stored under `key` as a string.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(SessionValue::as_string)
    }

    /// Returns true if a value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<SessionValue> {
        self.values.remove(key)
    }

    /// Returns all keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the message id.
    #[must_use]
    pub fn message_id(&self) -> Option<String> {
        self.get_string(MESSAGE_ID_KEY)
    }

    /// Returns the correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> Option<String> {
        self.get_string(CORRELATION_ID_KEY)
    }

    /// Returns the time the message was received.
    #[must_use]
    pub fn received(&self) -> Option<DateTime<Utc>> {
        match self.values.get(TS_RECEIVED_KEY) {
            Some(SessionValue::Timestamp(ts)) => Some(*ts),
            Some(other) => other
                .as_string()
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            None => None,
        }
    }

    /// Returns the message as it entered the pipeline.
    #[must_use]
    pub fn original_message(&self) -> Option<Message> {
        self.get_message(ORIGINAL_MESSAGE_KEY)
    }

    /// Returns the trace context of this invocation.
    #[must_use]
    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Registers a resource to release when the session closes.
    pub fn register_closeable(
        &self,
        description: impl Into<String>,
        close: impl FnOnce() + Send + 'static,
    ) {
        self.closeables
            .lock()
            .push((description.into(), Box::new(close)));
    }

    /// Removes a registered resource without releasing it. Returns true if found.
    pub fn unregister_closeable(&self, description: &str) -> bool {
        let mut closeables = self.closeables.lock();
        match closeables.iter().rposition(|(d, _)| d == description) {
            Some(index) => {
                closeables.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the number of registered resources.
    #[must_use]
    pub fn closeable_count(&self) -> usize {
        self.closeables.lock().len()
    }

    /// Releases all registered resources, most recently registered first.
    pub fn close(&self) {
        let closeables = std::mem::take(&mut *self.closeables.lock());
        for (description, close) in closeables.into_iter().rev() {
            debug!(resource = %description, "closing session resource");
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(close)).is_err() {
                warn!(resource = %description, "session resource panicked while closing");
            }
        }
    }

    pub(crate) fn current_transaction(&self) -> Option<&TransactionHandle> {
        self.transactions.last().and_then(Option::as_ref)
    }

    pub(crate) fn push_transaction(&mut self, transaction: Option<TransactionHandle>) {
        self.transactions.push(transaction);
    }

    pub(crate) fn transaction_depth(&self) -> usize {
        self.transactions.len()
    }

    /// Removes every stack entry at `depth` and above, innermost first.
    pub(crate) fn unwind_transactions(&mut self, depth: usize) -> Vec<Option<TransactionHandle>> {
        if depth >= self.transactions.len() {
            return Vec::new();
        }
        let mut entries = self.transactions.split_off(depth);
        entries.reverse();
        entries
    }
}

impl Default for PipeLineSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PipeLineSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for PipeLineSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeLineSession")
            .field("values", &self.values)
            .field("closeables", &self.closeable_count())
            .field("transaction_depth", &self.transactions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_message_id() {
        let session = PipeLineSession::with_message_id("m-1");
        assert_eq!(session.message_id(), Some("m-1".to_string()));
        assert_eq!(session.correlation_id(), None);
    }

    #[test]
    fn test_session_value_conversions() {
        let mut session = PipeLineSession::new();
        session.insert("text", "abc");
        session.insert("number", 42);
        session.insert("message", Message::text("payload"));
        session.insert("nothing", serde_json::Value::Null);

        assert_eq!(session.get_string("text"), Some("abc".to_string()));
        assert_eq!(session.get_string("number"), Some("42".to_string()));
        assert_eq!(session.get_message("message"), Some(Message::text("payload")));
        assert!(session.get_message("nothing").is_some_and(|m| m.is_null()));
        assert_eq!(session.get_string("nothing"), None);
        assert_eq!(session.len(), 4);
    }

    #[test]
    fn test_received_timestamp() {
        let mut session = PipeLineSession::new();
        assert!(session.received().is_none());

        let now = Utc::now();
        session.insert(TS_RECEIVED_KEY, now);
        assert_eq!(session.received(), Some(now));

        session.insert(TS_RECEIVED_KEY, "2024-01-02T03:04:05+00:00");
        assert!(session.received().is_some());
    }

    #[test]
    fn test_closeables_released_in_reverse_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let session = PipeLineSession::new();
            for name in ["first", "second", "third"] {
                let order = order.clone();
                session.register_closeable(name, move || order.lock().push(name));
            }
            assert_eq!(session.closeable_count(), 3);
        }
        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_unregistered_closeable_not_released() {
        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let session = PipeLineSession::new();
        let flag = released.clone();
        session.register_closeable("stream", move || {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        assert!(session.unregister_closeable("stream"));
        assert!(!session.unregister_closeable("stream"));
        session.close();
        assert!(!released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_close_is_idempotent() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let session = PipeLineSession::new();
        let counter = count.clone();
        session.register_closeable("once", move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        session.close();
        session.close();
        drop(session);
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
