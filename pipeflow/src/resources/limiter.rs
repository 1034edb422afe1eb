//! Shared concurrency limits.
//!
//! Every pipe or pipeline that declares a maximum number of concurrent
//! invocations owns one counting semaphore, created on first use and keyed by
//! the owner's configured name.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::errors::PipeRunError;

/// Registry of semaphores keyed by owner name.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    semaphores: DashMap<String, Arc<Semaphore>>,
}

impl LimiterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the semaphore of `owner`, creating it with `max_threads` permits
    /// if it does not exist yet. Concurrent first calls create exactly one.
    #[must_use]
    pub fn semaphore(&self, owner: &str, max_threads: usize) -> Arc<Semaphore> {
        self.semaphores
            .entry(owner.to_string())
            .or_insert_with(|| {
                debug!(owner = %owner, max_threads, "creating concurrency limiter");
                Arc::new(Semaphore::new(max_threads))
            })
            .clone()
    }

    /// Waits for a permit of `owner`'s semaphore.
    ///
    /// # Errors
    ///
    /// Returns an `Interrupted` error if the semaphore was closed while waiting.
    pub async fn acquire(&self, owner: &str, max_threads: usize) -> Result<LimiterPermit, PipeRunError> {
        let semaphore = self.semaphore(owner, max_threads);
        let started = Instant::now();
        let permit = semaphore.acquire_owned().await.map_err(|e| {
            PipeRunError::interrupted(format!("interrupted waiting for concurrency limit of [{owner}]"))
                .with_source(e)
        })?;
        Ok(LimiterPermit {
            _permit: permit,
            waited: started.elapsed(),
        })
    }

    /// Returns the number of permits currently available to `owner`.
    #[must_use]
    pub fn available_permits(&self, owner: &str) -> Option<usize> {
        self.semaphores.get(owner).map(|s| s.available_permits())
    }

    /// Closes the semaphore of `owner`; current and future waiters are interrupted.
    pub fn close(&self, owner: &str) {
        if let Some(semaphore) = self.semaphores.get(owner) {
            semaphore.close();
        }
    }

    /// Returns the number of registered owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.semaphores.len()
    }

    /// Returns true if no semaphore was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.semaphores.is_empty()
    }
}

/// A held permit. The permit is returned when this value is dropped.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    waited: Duration,
}

impl LimiterPermit {
    /// Returns how long the caller waited for the permit.
    #[must_use]
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipeRunErrorKind;

    #[tokio::test]
    async fn test_semaphore_created_once() {
        let registry = LimiterRegistry::new();
        let a = registry.semaphore("adapter/A", 2);
        let b = registry.semaphore("adapter/A", 5);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.available_permits(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let registry = LimiterRegistry::new();
        let permit = registry.acquire("p", 1).await.unwrap();
        assert_eq!(registry.available_permits("p"), Some(0));

        drop(permit);
        assert_eq!(registry.available_permits("p"), Some(1));
    }

    #[tokio::test]
    async fn test_waiter_blocks_until_release() {
        let registry = Arc::new(LimiterRegistry::new());
        let held = registry.acquire("p", 1).await.unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("p", 1).await.map(|p| p.waited()) })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let waited = waiter.await.unwrap().unwrap();
        assert!(waited >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_closed_semaphore_interrupts() {
        let registry = LimiterRegistry::new();
        let _ = registry.semaphore("p", 1);
        registry.close("p");

        let err = registry.acquire("p", 1).await.unwrap_err();
        assert_eq!(err.kind(), PipeRunErrorKind::Interrupted);
    }
}
