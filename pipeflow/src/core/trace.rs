//! Explicit logging trace context.
//!
//! Values such as the message id are bound for the duration of a scope and
//! removed again when the returned [`TraceScope`] is dropped.

use parking_lot::Mutex;
use std::sync::Arc;

/// Key/value pairs describing the invocation currently being processed.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl TraceContext {
    /// Creates an empty trace context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `key` to `value` until the returned scope is dropped.
    ///
    /// Scopes nest: an inner binding of the same key shadows the outer one and
    /// the outer value is visible again once the inner scope ends.
    #[must_use = "the binding is removed as soon as the scope is dropped"]
    pub fn scoped(&self, key: impl Into<String>, value: impl Into<String>) -> TraceScope {
        let mut entries = self.entries.lock();
        let depth = entries.len();
        entries.push((key.into(), value.into()));
        TraceScope {
            context: self.clone(),
            depth,
        }
    }

    /// Returns the innermost value bound to `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Returns all bindings, outermost first.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Guard returned by [`TraceContext::scoped`].
#[derive(Debug)]
pub struct TraceScope {
    context: TraceContext,
    depth: usize,
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        self.context.entries.lock().truncate(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_binds_and_unbinds() {
        let trace = TraceContext::new();
        {
            let _scope = trace.scoped("mid", "m-1");
            assert_eq!(trace.get("mid"), Some("m-1".to_string()));
        }
        assert_eq!(trace.get("mid"), None);
        assert!(trace.is_empty());
    }

    #[test]
    fn test_nested_scopes_restore_outer_value() {
        let trace = TraceContext::new();
        let _outer = trace.scoped("mid", "outer");
        {
            let _inner = trace.scoped("mid", "inner");
            assert_eq!(trace.get("mid"), Some("inner".to_string()));
        }
        assert_eq!(trace.get("mid"), Some("outer".to_string()));
    }

    #[test]
    fn test_clones_share_bindings() {
        let trace = TraceContext::new();
        let clone = trace.clone();
        let _scope = trace.scoped("pipe", "A");

        assert_eq!(clone.entries(), vec![("pipe".to_string(), "A".to_string())]);
    }
}
