//! Read-through response cache in front of any `Call`.
//!
//! # Design
//! Responses are keyed by the method name plus the serialized parameters, so
//! two calls match only when their `rest_data` would be byte-identical. Each
//! access stamps the entry with a fresh tick from a logical clock; a
//! `BTreeMap` from tick to key keeps the least-recently-used entry at the
//! front, so eviction is a single `pop_first`.
//!
//! Cache bookkeeping never fails a call. If a key cannot be built the call
//! simply goes to the server uncached.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::{Call, Parameters};
use crate::error::ApiError;

pub const DEFAULT_CAPACITY: usize = 100;

/// Methods that log in/out or write data; their responses are never cached.
pub const UNCACHED_METHODS: &[&str] = &[
    "login",
    "logout",
    "set_entry",
    "set_entries",
    "set_relationship",
    "set_relationships",
    "set_note_attachment",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: String,
    parameters: String,
}

impl CacheKey {
    pub fn new(method: &str, parameters: &Parameters) -> Result<Self, serde_json::Error> {
        Ok(Self {
            method: method.to_string(),
            parameters: serde_json::to_string(parameters)?,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

#[derive(Debug)]
struct CachedResponse {
    response: Value,
    last_accessed: u64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded map of responses with least-recently-accessed eviction.
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    entries: HashMap<CacheKey, CachedResponse>,
    access_index: BTreeMap<u64, CacheKey>,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            access_index: BTreeMap::new(),
            clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Cached response for `key`, refreshing its recency on a hit.
    pub fn get(&mut self, key: &CacheKey) -> Option<Value> {
        let now = self.tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.access_index.remove(&entry.last_accessed);
                self.access_index.insert(now, key.clone());
                entry.last_accessed = now;
                self.hits += 1;
                Some(entry.response.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a response, then evict one entry if over capacity.
    /// Returns the evicted key, if any.
    pub fn insert(&mut self, key: CacheKey, response: Value) -> Option<CacheKey> {
        let now = self.tick();
        if let Some(previous) = self.entries.remove(&key) {
            self.access_index.remove(&previous.last_accessed);
        }
        self.access_index.insert(now, key.clone());
        self.entries.insert(
            key,
            CachedResponse {
                response,
                last_accessed: now,
            },
        );

        if self.entries.len() > self.capacity {
            self.evict_oldest()
        } else {
            None
        }
    }

    fn evict_oldest(&mut self) -> Option<CacheKey> {
        let (_, oldest) = self.access_index.pop_first()?;
        self.entries.remove(&oldest);
        self.evictions += 1;
        Some(oldest)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_index.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Wraps a `Call` with a `ResponseCache`.
pub struct CachingClient<C> {
    inner: C,
    cache: Mutex<ResponseCache>,
}

impl<C: Call> CachingClient<C> {
    pub fn new(inner: C) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: C, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(ResponseCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
        debug!("response cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn is_cached(&self, method: &str, parameters: &Parameters) -> bool {
        CacheKey::new(method, parameters)
            .map(|key| self.cache().contains(&key))
            .unwrap_or(false)
    }

    // A panic while holding the lock leaves the maps consistent; keep using them.
    fn cache(&self) -> MutexGuard<'_, ResponseCache> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            warn!("response cache lock was poisoned, recovering");
            self.cache.clear_poison();
            poisoned.into_inner()
        })
    }
}

impl<C: Call> Call for CachingClient<C> {
    fn call(&self, method: &str, parameters: &Parameters) -> Result<Value, ApiError> {
        if UNCACHED_METHODS.contains(&method) {
            return self.inner.call_uncached(method, parameters);
        }

        let key = match CacheKey::new(method, parameters) {
            Ok(key) => key,
            Err(e) => {
                warn!(method, error = %e, "cannot build cache key, calling uncached");
                return self.inner.call(method, parameters);
            }
        };

        if let Some(response) = self.cache().get(&key) {
            debug!(method, "cache hit");
            return Ok(response);
        }
        debug!(method, "cache miss");

        let response = self.inner.call(method, parameters)?;
        if let Some(evicted) = self.cache().insert(key, response.clone()) {
            debug!(method = evicted.method(), "evicted least recently used response");
        }
        Ok(response)
    }

    fn call_uncached(&self, method: &str, parameters: &Parameters) -> Result<Value, ApiError> {
        self.inner.call_uncached(method, parameters)
    }
}
