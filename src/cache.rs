//! In-memory response cache with a fixed per-entry TTL.
//!
//! # Expiry
//!
//! An entry is visible only while `now < inserted_at + ttl`. Expiry is
//! enforced on every read; expired entries found by `get` are removed on the
//! spot. `purge_expired` is an optional sweep that reclaims memory for keys
//! nobody reads again; it never changes what `get` returns.
//!
//! # Thread Safety
//!
//! Backed by a sharded `DashMap`. Each `get`/`set` is atomic for its key and
//! no lock is ever held across an `.await`.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::trace;

/// A stored value with its insertion time.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// Thread-safe key/value store with a process-wide default TTL.
///
/// Values are cloned out on `get`, so `V` should be cheap to clone
/// (e.g. `Bytes`-backed).
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> CacheStore<V> {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Return the value under `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Store `value` under `key`, replacing any previous entry and
    /// restarting its TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_at(key, value, Instant::now());
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Number of physically stored entries (expired ones included until purged).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The TTL applied to every entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(self.ttl, now) {
                return Some(entry.value.clone());
            }
            // Release the shard read guard before taking the write lock
            drop(entry);
            // Only remove if still expired; a concurrent `set` may have replaced it
            self.entries
                .remove_if(key, |_, entry| entry.is_expired(self.ttl, now));
            trace!(key, "Evicted expired cache entry on read");
        }
        None
    }

    pub(crate) fn set_at(&self, key: impl Into<String>, value: V, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(self.ttl, now));
        before.saturating_sub(self.entries.len())
    }
}
