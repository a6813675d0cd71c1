//! Response cache
//!
//! A concurrent map from a SHA-256 key over the canonical request to a
//! JSON-serialized response. Entries expire passively on read; [`ResultCache::sweep`]
//! drops expired entries on demand. Entries are replaced whole, never
//! mutated in place.
//!
//! Cache failures never fail a search: a value that cannot be serialized
//! or read back is logged and treated as a miss.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::search::query::Query;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default entry bound.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// SHA-256 hex digest of the canonical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key over normalized text, canonical filters, weights (or
    /// `adaptive`), the effective rerank flag and the page window.
    pub fn derive(query: &Query, rerank: bool) -> Self {
        let weights = query
            .weights()
            .map_or_else(|| "adaptive".to_string(), |w| w.canonical_key());

        let filters = query.filters().canonical_key();
        let limit = query.limit().to_string();
        let offset = query.offset().to_string();
        let parts: [&str; 6] = [
            query.text(),
            &filters,
            &weights,
            if rerank { "rerank" } else { "fused" },
            &limit,
            &offset,
        ];

        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            // field separator
            hasher.update([0x1f]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: String,
    created: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.created.elapsed() >= self.ttl
    }

    pub const fn created(&self) -> Instant {
        self.created
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

/// Shared response cache. Safe for concurrent reads and writes.
#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    enabled: bool,
    counters: Counters,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl ResultCache {
    /// `max_entries == 0` means unbounded.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            enabled: true,
            counters: Counters::default(),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, or `None` on miss, expiry or a value that
    /// no longer deserializes.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let raw = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let Some(raw) = raw else {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache entry expired");
            return None;
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(err) => {
                let err = SearchError::CacheUnavailable(format!("unreadable entry: {err}"));
                warn!(key = %key, error = %err, "bypassing cache");
                self.entries.remove(key);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` with the default TTL.
    pub fn put<T: Serialize>(&self, key: CacheKey, value: &T) {
        self.put_with_ttl(key, value, self.ttl);
    }

    /// Store `value`, replacing any entry under `key`.
    pub fn put_with_ttl<T: Serialize>(&self, key: CacheKey, value: &T, ttl: Duration) {
        if !self.enabled {
            return;
        }
        let value = match serde_json::to_string(value) {
            Ok(value) => value,
            Err(err) => {
                let err = SearchError::CacheUnavailable(format!("unserializable value: {err}"));
                warn!(key = %key, error = %err, "skipping cache write");
                return;
            }
        };

        if self.max_entries > 0
            && self.entries.len() >= self.max_entries
            && !self.entries.contains_key(&key)
        {
            self.evict_oldest();
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                created: Instant::now(),
                ttl,
            },
        );
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.counters
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "cache sweep");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.get(key).is_some_and(|entry| !entry.is_expired())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.created)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}
