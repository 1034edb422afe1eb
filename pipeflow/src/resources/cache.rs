//! Result caching for pipelines.

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, Instant};

use crate::core::{ExitState, Message, PipeLineSession};
use crate::errors::{CacheError, ConfigurationError};

/// A cached pipeline outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The cached result message.
    pub value: Message,
    /// The exit state of the run that produced it.
    pub state: ExitState,
    /// The exit code of the run that produced it.
    pub exit_code: i32,
}

impl CacheEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(value: Message, state: ExitState, exit_code: i32) -> Self {
        Self {
            value,
            state,
            exit_code,
        }
    }
}

/// A result cache.
#[async_trait]
pub trait Cache: Send + Sync + fmt::Debug {
    /// Returns the configured cache name.
    fn name(&self) -> &str;

    /// Derives the cache key from the input. `None` disables caching for this message.
    fn transform_key(&self, input: &Message, session: &PipeLineSession) -> Option<String>;

    /// Derives the value to store from the result. `None` skips storing.
    fn transform_value(&self, value: &Message, _session: &PipeLineSession) -> Option<Message> {
        Some(value.clone())
    }

    /// Looks up a key.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores an entry, replacing any previous one.
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
}

/// How the cache key is derived from a message.
#[derive(Debug, Clone, Default)]
enum KeySource {
    #[default]
    Input,
    SessionKey(String),
    Pattern(Regex),
}

/// Cache held in process memory.
#[derive(Debug)]
pub struct InMemoryCache {
    name: String,
    entries: DashMap<String, (CacheEntry, Instant)>,
    key_source: KeySource,
    hash_keys: bool,
    cache_empty_keys: bool,
    time_to_live: Option<Duration>,
    max_entries: Option<usize>,
}

impl InMemoryCache {
    /// Creates a cache keyed by the complete input message.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            key_source: KeySource::Input,
            hash_keys: false,
            cache_empty_keys: false,
            time_to_live: None,
            max_entries: None,
        }
    }

    /// Takes the key from a session value instead of the input.
    #[must_use]
    pub fn with_key_from_session(mut self, key: impl Into<String>) -> Self {
        self.key_source = KeySource::SessionKey(key.into());
        self
    }

    /// Takes the key from a regex match on the input; the first capture group is
    /// used if the pattern has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn with_key_pattern(mut self, pattern: &str) -> Result<Self, ConfigurationError> {
        let regex = Regex::new(pattern).map_err(|e| {
            ConfigurationError::new(format!("invalid key pattern [{pattern}]: {e}"))
                .with_component(format!("cache [{}]", self.name))
        })?;
        self.key_source = KeySource::Pattern(regex);
        Ok(self)
    }

    /// Stores keys as SHA-256 digests.
    #[must_use]
    pub fn with_hashed_keys(mut self, hash: bool) -> Self {
        self.hash_keys = hash;
        self
    }

    /// Uses the empty string as a key instead of disabling caching.
    #[must_use]
    pub fn with_cache_empty_keys(mut self, cache: bool) -> Self {
        self.cache_empty_keys = cache;
        self
    }

    /// Expires entries after `ttl`.
    #[must_use]
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Limits the number of entries; the oldest entry is evicted first.
    #[must_use]
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Returns the number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn is_expired(&self, stored_at: Instant) -> bool {
        self.time_to_live
            .is_some_and(|ttl| stored_at.elapsed() >= ttl)
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().1)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform_key(&self, input: &Message, session: &PipeLineSession) -> Option<String> {
        let raw = match &self.key_source {
            KeySource::Input => input.as_string(),
            KeySource::SessionKey(key) => session.get_string(key),
            KeySource::Pattern(regex) => input.as_text().and_then(|text| {
                regex.captures(&text).map(|caps| {
                    caps.get(1)
                        .or_else(|| caps.get(0))
                        .map_or_else(String::new, |m| m.as_str().to_string())
                })
            }),
        };

        let key = match raw {
            Some(key) if !key.is_empty() => key,
            _ if self.cache_empty_keys => String::new(),
            _ => return None,
        };

        if self.hash_keys {
            Some(hex::encode(Sha256::digest(key.as_bytes())))
        } else {
            Some(key)
        }
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        let (value, stored_at) = entry.value().clone();
        drop(entry);

        if self.is_expired(stored_at) {
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(value))
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        if let Some(max) = self.max_entries {
            if max == 0 {
                return Ok(());
            }
            while self.entries.len() >= max && !self.entries.contains_key(key) {
                self.evict_oldest();
            }
        }
        self.entries.insert(key.to_string(), (entry, Instant::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> CacheEntry {
        CacheEntry::new(Message::text(text), ExitState::Success, 0)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = InMemoryCache::new("c");
        cache.put("k", entry("v")).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(entry("v")));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[test]
    fn test_key_from_input() {
        let cache = InMemoryCache::new("c");
        let session = PipeLineSession::new();

        assert_eq!(cache.transform_key(&Message::text("abc"), &session), Some("abc".to_string()));
        assert_eq!(cache.transform_key(&Message::text(""), &session), None);
        assert_eq!(cache.transform_key(&Message::null(), &session), None);
    }

    #[test]
    fn test_empty_keys_can_be_cached() {
        let cache = InMemoryCache::new("c").with_cache_empty_keys(true);
        let session = PipeLineSession::new();
        assert_eq!(cache.transform_key(&Message::null(), &session), Some(String::new()));
    }

    #[test]
    fn test_key_from_session() {
        let cache = InMemoryCache::new("c").with_key_from_session("customer");
        let mut session = PipeLineSession::new();
        assert_eq!(cache.transform_key(&Message::text("x"), &session), None);

        session.insert("customer", "42");
        assert_eq!(cache.transform_key(&Message::text("x"), &session), Some("42".to_string()));
    }

    #[test]
    fn test_key_from_pattern() {
        let cache = InMemoryCache::new("c").with_key_pattern(r"<id>(\d+)</id>").unwrap();
        let session = PipeLineSession::new();

        assert_eq!(
            cache.transform_key(&Message::text("<req><id>7</id></req>"), &session),
            Some("7".to_string())
        );
        assert_eq!(cache.transform_key(&Message::text("<req/>"), &session), None);
        assert!(InMemoryCache::new("c").with_key_pattern("(").is_err());
    }

    #[test]
    fn test_hashed_keys() {
        let cache = InMemoryCache::new("c").with_hashed_keys(true);
        let session = PipeLineSession::new();
        let key = cache.transform_key(&Message::text("abc"), &session).unwrap();

        assert_eq!(key, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = InMemoryCache::new("c").with_time_to_live(Duration::from_millis(10));
        cache.put("k", entry("v")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_max_entries_evicts_oldest() {
        let cache = InMemoryCache::new("c").with_max_entries(2);
        cache.put("a", entry("1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put("b", entry("2")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.put("c", entry("3")).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.get("c").await.unwrap().is_some());
    }
}
