//! Response cache: TTL-bounded, invalidation-driven storage of serialized read results
//!
//! Entries are keyed by logical resource family plus query, e.g. `books:item:3` or
//! `books:list?page=1&per_page=10`. Invalidation removes every key equal to or prefixed
//! by its argument, immediately. The cache never holds authoritative state: any failure
//! to store degrades to an uncached read.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;

use super::clock::Clock;

/// Logical resource families, each with its own time-to-live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFamily {
    /// Listings of a collection
    Collection,
    /// One resource by id
    Item,
    /// Free-text search results
    Search,
    /// Time-sensitive aggregates (overdue list, borrow listings)
    Aggregate,
}

/// Deterministic short hash of a serialized value, used as the entity tag
pub fn fingerprint(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    hex::encode(&digest[..8])
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Arc<[u8]>,
    fingerprint: String,
    created_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.created_at + self.ttl
    }
}

/// A fresh cached value
#[derive(Debug, Clone)]
pub struct CachedValue {
    pub payload: Arc<[u8]>,
    pub fingerprint: String,
    /// Seconds since the entry was stored
    pub age_secs: i64,
}

/// Outcome of a cache lookup. A miss is a normal answer, not an error.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(CachedValue),
    /// The client already holds the current value
    NotModified { fingerprint: String, age_secs: i64 },
    Miss,
}

/// Marks the invalidation epoch a read started in. A value computed under a ticket
/// is dropped on store if any invalidation happened since.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket {
    epoch: u64,
}

/// Snapshot for the cache status endpoint
#[derive(Debug, Clone)]
pub struct CacheStatus {
    pub enabled: bool,
    pub entries: usize,
    pub keys: Vec<String>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, CacheEntry>,
    epoch: u64,
}

#[derive(Clone)]
pub struct ResponseCache {
    state: Arc<RwLock<State>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            clock,
            config,
        }
    }

    pub fn ttl(&self, family: CacheFamily) -> Duration {
        let secs = match family {
            CacheFamily::Collection => self.config.collection_ttl_secs,
            CacheFamily::Item => self.config.item_ttl_secs,
            CacheFamily::Search => self.config.search_ttl_secs,
            CacheFamily::Aggregate => self.config.aggregate_ttl_secs,
        };
        Duration::seconds(secs as i64)
    }

    /// Look up a fresh entry
    pub fn get(&self, key: &str) -> CacheLookup {
        if !self.config.enabled {
            return CacheLookup::Miss;
        }
        let now = self.clock.now();
        let Ok(state) = self.state.read() else {
            tracing::warn!(key, "Response cache lock poisoned, serving uncached");
            return CacheLookup::Miss;
        };
        match state.entries.get(key) {
            Some(entry) if entry.is_fresh(now) => CacheLookup::Hit(CachedValue {
                payload: entry.payload.clone(),
                fingerprint: entry.fingerprint.clone(),
                age_secs: (now - entry.created_at).num_seconds(),
            }),
            _ => CacheLookup::Miss,
        }
    }

    /// Like [`get`](Self::get), but answers `NotModified` when the fresh entry carries
    /// `client_fingerprint`
    pub fn get_if_match(&self, key: &str, client_fingerprint: &str) -> CacheLookup {
        match self.get(key) {
            CacheLookup::Hit(value) if value.fingerprint == client_fingerprint => {
                CacheLookup::NotModified {
                    fingerprint: value.fingerprint,
                    age_secs: value.age_secs,
                }
            }
            other => other,
        }
    }

    /// Current invalidation epoch; take it before computing a value to cache
    pub fn ticket(&self) -> CacheTicket {
        let epoch = match self.state.read() {
            Ok(state) => state.epoch,
            Err(poisoned) => poisoned.into_inner().epoch,
        };
        CacheTicket { epoch }
    }

    /// Store `payload` under `key` and return its fingerprint
    pub fn put(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> String {
        self.store(None, key, payload, ttl)
    }

    /// Store `payload` unless an invalidation happened after `ticket` was taken.
    /// The fingerprint is returned either way.
    pub fn put_after(&self, ticket: CacheTicket, key: &str, payload: Vec<u8>, ttl: Duration) -> String {
        self.store(Some(ticket), key, payload, ttl)
    }

    fn store(&self, ticket: Option<CacheTicket>, key: &str, payload: Vec<u8>, ttl: Duration) -> String {
        let fingerprint = fingerprint(&payload);
        if !self.config.enabled {
            return fingerprint;
        }

        let now = self.clock.now();
        let Ok(mut state) = self.state.write() else {
            tracing::warn!(key, "Response cache lock poisoned, entry not stored");
            return fingerprint;
        };

        if let Some(ticket) = ticket {
            if ticket.epoch != state.epoch {
                tracing::debug!(key, "Discarding value computed before an invalidation");
                return fingerprint;
            }
        }

        if !state.entries.contains_key(key) && state.entries.len() >= self.config.max_entries {
            state.entries.retain(|_, entry| entry.is_fresh(now));
            if state.entries.len() >= self.config.max_entries {
                tracing::warn!(
                    key,
                    max_entries = self.config.max_entries,
                    "Response cache full, entry not stored"
                );
                return fingerprint;
            }
        }

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                payload: payload.into(),
                fingerprint: fingerprint.clone(),
                created_at: now,
                ttl,
            },
        );
        fingerprint
    }

    /// Remove every entry whose key equals or starts with `prefix`
    pub fn invalidate(&self, prefix: &str) -> usize {
        // Invalidation must go through even after a panic elsewhere
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(prefix));
        state.epoch += 1;
        let removed = before - state.entries.len();
        tracing::debug!(prefix, removed, "Invalidated cache entries");
        removed
    }

    /// Drop every entry
    pub fn clear(&self) -> usize {
        self.invalidate("")
    }

    pub fn status(&self) -> CacheStatus {
        let (entries, mut keys) = match self.state.read() {
            Ok(state) => (state.entries.len(), state.entries.keys().cloned().collect::<Vec<_>>()),
            Err(_) => (0, Vec::new()),
        };
        keys.sort();
        CacheStatus {
            enabled: self.config.enabled,
            entries,
            keys,
        }
    }
}
