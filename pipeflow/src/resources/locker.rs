//! Named locks around pipes and pipelines.
//!
//! A pipe that cannot obtain its lock fails; a pipeline that cannot obtain its
//! lock skips the message and reports success.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::PipeLineSession;
use crate::errors::LockerError;
use crate::utils::generate_token;

/// Proof of ownership of a lock, handed back on release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken {
    object_id: String,
    token: String,
}

impl LockToken {
    /// Creates a token for a lock.
    #[must_use]
    pub fn new(object_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            token: token.into(),
        }
    }

    /// Returns the name of the locked object.
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Returns the ownership token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.object_id)
    }
}

/// A lock provider.
#[async_trait]
pub trait Locker: Send + Sync + fmt::Debug {
    /// Returns the configured name of the lock.
    fn object_id(&self) -> &str;

    /// Tries to obtain the lock. `Ok(None)` means the lock is held elsewhere.
    async fn acquire(&self, session: &PipeLineSession) -> Result<Option<LockToken>, LockerError>;

    /// Releases a lock obtained from [`acquire`](Self::acquire).
    async fn release(&self, token: LockToken) -> Result<(), LockerError>;

    /// Releases a lock without waiting, if the backend can.
    ///
    /// `None` means the backend needs [`release`](Self::release).
    fn release_now(&self, _token: &LockToken) -> Option<Result<(), LockerError>> {
        None
    }
}

/// A held lock, released when the guard is dropped.
///
/// [`LockGuard::release`] gives the lock back and reports problems. A guard
/// dropped without that call, for instance because a timeout cancelled the
/// work it protects, still releases the lock: immediately when the locker
/// supports [`Locker::release_now`], otherwise on a spawned task.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    locker: Arc<dyn Locker>,
    token: Option<LockToken>,
}

impl LockGuard {
    /// Guards `token`, obtained from `locker`.
    pub fn new(locker: Arc<dyn Locker>, token: LockToken) -> Self {
        Self {
            locker,
            token: Some(token),
        }
    }

    /// Returns the name of the locked object.
    #[must_use]
    pub fn object_id(&self) -> &str {
        self.token.as_ref().map_or("", LockToken::object_id)
    }

    /// Releases the lock.
    ///
    /// # Errors
    ///
    /// Returns the locker's error if the lock could not be released.
    pub async fn release(mut self) -> Result<(), LockerError> {
        match self.token.take() {
            Some(token) => self.locker.release(token).await,
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        match self.locker.release_now(&token) {
            Some(Ok(())) => debug!(lock = %token, "released lock of cancelled work"),
            Some(Err(err)) => warn!(lock = %token, error = %err, "could not release lock of cancelled work"),
            None => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let locker = Arc::clone(&self.locker);
                    runtime.spawn(async move {
                        let lock = token.to_string();
                        if let Err(err) = locker.release(token).await {
                            warn!(lock = %lock, error = %err, "could not release lock of cancelled work");
                        }
                    });
                }
                Err(_) => warn!(lock = %token, "no runtime left to release lock of cancelled work"),
            },
        }
    }
}

/// Table of currently held locks, shared by all lockers that use it.
#[derive(Debug, Default)]
pub struct LockTable {
    held: DashMap<String, String>,
}

impl LockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide table.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<LockTable>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Records `token` as owner of `object_id` if nobody holds it.
    pub fn try_lock(&self, object_id: &str, token: &str) -> bool {
        match self.held.entry(object_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(token.to_string());
                true
            }
        }
    }

    /// Removes the lock on `object_id` if it is owned by `token`.
    pub fn unlock(&self, object_id: &str, token: &str) -> bool {
        self.held
            .remove_if(object_id, |_, owner| owner == token)
            .is_some()
    }

    /// Returns true if `object_id` is locked.
    #[must_use]
    pub fn is_locked(&self, object_id: &str) -> bool {
        self.held.contains_key(object_id)
    }

    /// Returns the number of held locks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Returns true if no lock is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

/// A locker backed by an in-process [`LockTable`].
#[derive(Debug, Clone)]
pub struct InMemoryLocker {
    object_id: String,
    session_key: Option<String>,
    retries: u32,
    retry_delay: Duration,
    table: Arc<LockTable>,
}

impl InMemoryLocker {
    /// Creates a locker on the global lock table that does not retry.
    #[must_use]
    pub fn new(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            session_key: None,
            retries: 0,
            retry_delay: Duration::from_millis(10),
            table: LockTable::global(),
        }
    }

    /// Uses a specific lock table.
    #[must_use]
    pub fn with_table(mut self, table: Arc<LockTable>) -> Self {
        self.table = table;
        self
    }

    /// Retries a taken lock `retries` times, waiting between `delay / 2` and
    /// `delay` in between so that competing lockers spread out.
    #[must_use]
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    /// Appends the value of a session key to the lock name, locking per value.
    #[must_use]
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    fn jittered_delay(&self) -> Duration {
        let millis = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX);
        let half = millis / 2;
        if half == 0 {
            self.retry_delay
        } else {
            Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
        }
    }

    fn unlock(&self, token: &LockToken) -> Result<(), LockerError> {
        if self.table.unlock(token.object_id(), token.token()) {
            Ok(())
        } else {
            Err(LockerError::NotHeld {
                object_id: token.object_id.clone(),
                token: token.token.clone(),
            })
        }
    }

    fn lock_name(&self, session: &PipeLineSession) -> String {
        match self
            .session_key
            .as_deref()
            .and_then(|key| session.get_string(key))
        {
            Some(value) => format!("{}|{value}", self.object_id),
            None => self.object_id.clone(),
        }
    }
}

#[async_trait]
impl Locker for InMemoryLocker {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    async fn acquire(&self, session: &PipeLineSession) -> Result<Option<LockToken>, LockerError> {
        let name = self.lock_name(session);
        let token = generate_token();

        for attempt in 0..=self.retries {
            if self.table.try_lock(&name, &token) {
                debug!(lock = %name, attempt, "lock obtained");
                return Ok(Some(LockToken::new(name, token)));
            }
            if attempt < self.retries {
                tokio::time::sleep(self.jittered_delay()).await;
            }
        }
        debug!(lock = %name, "lock not obtained");
        Ok(None)
    }

    async fn release(&self, token: LockToken) -> Result<(), LockerError> {
        self.unlock(&token)
    }

    fn release_now(&self, token: &LockToken) -> Option<Result<(), LockerError>> {
        Some(self.unlock(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locker(name: &str) -> InMemoryLocker {
        InMemoryLocker::new(name).with_table(Arc::new(LockTable::new()))
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let locker = locker("job");
        let session = PipeLineSession::new();

        let token = locker.acquire(&session).await.unwrap().unwrap();
        assert_eq!(token.object_id(), "job");
        assert!(locker.acquire(&session).await.unwrap().is_none());

        locker.release(token).await.unwrap();
        assert!(locker.acquire(&session).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_release_with_foreign_token_fails() {
        let locker = locker("job");
        let session = PipeLineSession::new();
        let _held = locker.acquire(&session).await.unwrap().unwrap();

        let err = locker.release(LockToken::new("job", "other")).await.unwrap_err();
        assert!(matches!(err, LockerError::NotHeld { .. }));
    }

    #[tokio::test]
    async fn test_retry_obtains_released_lock() {
        let table = Arc::new(LockTable::new());
        let first = InMemoryLocker::new("job").with_table(table.clone());
        let second = InMemoryLocker::new("job")
            .with_table(table.clone())
            .with_retries(20, Duration::from_millis(5));
        let session = PipeLineSession::new();

        let token = first.acquire(&session).await.unwrap().unwrap();
        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            first.release(token).await
        });

        let obtained = second.acquire(&session).await.unwrap();
        assert!(obtained.is_some());
        releaser.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_lock() {
        let table = Arc::new(LockTable::new());
        let locker: Arc<dyn Locker> = Arc::new(InMemoryLocker::new("job").with_table(table.clone()));
        let session = PipeLineSession::new();

        let token = locker.acquire(&session).await.unwrap().unwrap();
        let guard = LockGuard::new(Arc::clone(&locker), token);
        assert_eq!(guard.object_id(), "job");
        drop(guard);
        assert!(!table.is_locked("job"));

        let token = locker.acquire(&session).await.unwrap().unwrap();
        LockGuard::new(Arc::clone(&locker), token).release().await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_session_key_partitions_locks() {
        let locker = locker("job").with_session_key("customer");
        let mut alice = PipeLineSession::new();
        alice.insert("customer", "alice");
        let mut bob = PipeLineSession::new();
        bob.insert("customer", "bob");

        let token = locker.acquire(&alice).await.unwrap().unwrap();
        assert_eq!(token.object_id(), "job|alice");
        assert!(locker.acquire(&bob).await.unwrap().is_some());
        assert!(locker.acquire(&alice).await.unwrap().is_none());
    }
}
