//! In-memory lookup cache in front of the record store.
//!
//! Keyed by canonical name, holding the unfiltered row list for that name.
//! Selection runs on every query, so one entry is correct for any qtype and
//! any client address. Invalidation is a whole-map clear: the health checker
//! and the DDNS path call [`LookupCache::clear`] after every mutation, and
//! the control plane is expected to do the same.

use crate::record::StoredRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct CacheEntry {
    expires: Instant,
    rows: Arc<Vec<StoredRecord>>,
}

/// Shared, clone-able lookup cache.
///
/// A TTL of zero disables caching entirely: reads always miss and inserts
/// are dropped.
#[derive(Debug, Clone)]
pub struct LookupCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl LookupCache {
    /// Create a cache with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// True when caching is disabled (`ttl == 0`).
    pub fn is_disabled(&self) -> bool {
        self.ttl.is_zero()
    }

    /// Look up unexpired rows for a canonical name.
    pub fn get(&self, name: &str) -> Option<Arc<Vec<StoredRecord>>> {
        self.get_at(name, Instant::now())
    }

    fn get_at(&self, name: &str, now: Instant) -> Option<Arc<Vec<StoredRecord>>> {
        if self.is_disabled() {
            return None;
        }
        let entries = self.entries.read();
        let entry = entries.get(name)?;
        if entry.expires <= now {
            return None;
        }
        Some(Arc::clone(&entry.rows))
    }

    /// Store rows for a name, stamping the expiry from the cache TTL.
    pub fn insert(&self, name: &str, rows: Arc<Vec<StoredRecord>>) {
        self.insert_at(name, rows, Instant::now());
    }

    fn insert_at(&self, name: &str, rows: Arc<Vec<StoredRecord>>, now: Instant) {
        if self.is_disabled() {
            return;
        }
        let mut entries = self.entries.write();
        entries.insert(
            name.to_string(),
            CacheEntry {
                expires: now + self.ttl,
                rows,
            },
        );
    }

    /// Drop every entry. The invalidation primitive for all write paths.
    pub fn clear(&self) {
        self.entries.write().clear();
        crate::metrics::record_cache_clear();
    }

    /// Number of live entries (expired ones included until overwritten).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
