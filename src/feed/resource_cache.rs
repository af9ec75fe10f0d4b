//! Per-resource cache of fetched update bundles.
//!
//! One entry per curated resource, keyed by [`ResourceRef::cache_key`]. The
//! whole map is persisted through the backing [`Store`] after every write and
//! reloaded (minus anything stale) at construction, so restarts don't spend
//! quota re-fetching what we already had.

use super::github::UpdateBundle;
use super::resource::ResourceRef;
use super::store::Store;
use chrono::{DateTime, Utc};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "     cache";

/// Name of the durable blob holding the serialized map.
const BLOB_NAME: &str = "resource-cache";

/// A cached bundle plus the time it was stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: UpdateBundle,
    pub timestamp: DateTime<Utc>,
}

/// Introspection report for the cache-status contract.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub entries: usize,
    pub keys: Vec<String>,
    pub last_cleanup: DateTime<Utc>,
    pub cache_duration_ms: u64,
}

#[derive(Debug)]
pub struct ResourceCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    store: Arc<dyn Store>,
    last_cleanup: Mutex<DateTime<Utc>>,
}

impl ResourceCache {
    /// Build the cache over `store`, reloading whatever fresh entries the
    /// previous run left behind.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        let now = Utc::now();
        let mut entries: HashMap<String, CacheEntry> = store
            .load(BLOB_NAME)
            .and_then(|payload| serde_json::from_str(&payload).ok())
            .unwrap_or_default();

        let loaded = entries.len();
        entries.retain(|_, entry| is_fresh(entry, now, ttl));
        if loaded > 0 {
            log::debug!(target: LOG_TARGET,
                "restored {} cached resources ({} stale entries dropped)",
                entries.len(), loaded - entries.len());
        }

        Self {
            entries: Mutex::new(entries),
            ttl,
            store,
            last_cleanup: Mutex::new(now),
        }
    }

    /// Fresh cached bundle for a resource, if any.
    #[must_use]
    pub fn get(&self, resource: &ResourceRef) -> Option<UpdateBundle> {
        let key = resource.cache_key()?;
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(&key)?;
        if is_fresh(entry, Utc::now(), self.ttl) {
            log::debug!(target: LOG_TARGET, "cache hit for {key}");
            Some(entry.data.clone())
        } else {
            None
        }
    }

    /// Store a bundle for a resource and persist the updated map. Resources
    /// without a usable cache key are silently skipped.
    pub fn set(&self, resource: &ResourceRef, bundle: UpdateBundle) {
        let Some(key) = resource.cache_key() else {
            return;
        };

        let Ok(mut entries) = self.entries.lock() else {
            return;
        };

        let _ = entries.insert(key, CacheEntry { data: bundle, timestamp: Utc::now() });
        self.persist(&entries);
    }

    /// Drop every entry, in memory and in the durable blob.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }

        if let Err(e) = self.store.remove(BLOB_NAME) {
            log::warn!(target: LOG_TARGET, "couldn't remove cache blob: {e}");
        }
    }

    /// Evict entries older than the TTL, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|_, entry| is_fresh(entry, now, self.ttl));
        let removed = before - entries.len();

        if removed > 0 {
            log::info!(target: LOG_TARGET, "evicted {removed} expired cache entries");
            self.persist(&entries);
        }

        if let Ok(mut last) = self.last_cleanup.lock() {
            *last = now;
        }

        removed
    }

    #[must_use]
    pub fn status(&self) -> CacheStatus {
        // One guard for both values, so the count always matches the key list.
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort_unstable();

        CacheStatus {
            entries: keys.len(),
            keys,
            last_cleanup: self.last_cleanup.lock().map(|l| *l).unwrap_or_else(|_| Utc::now()),
            cache_duration_ms: self.ttl.as_millis() as u64,
        }
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        match serde_json::to_string(entries) {
            Ok(payload) => {
                if let Err(e) = self.store.save(BLOB_NAME, &payload) {
                    log::warn!(target: LOG_TARGET, "couldn't persist resource cache: {e}");
                }
            }
            Err(e) => log::warn!(target: LOG_TARGET, "couldn't serialize resource cache: {e}"),
        }
    }
}

/// Entries with a future timestamp (clock rollback between runs) count as
/// fresh rather than being evicted.
fn is_fresh(entry: &CacheEntry, now: DateTime<Utc>, ttl: Duration) -> bool {
    match (now - entry.timestamp).to_std() {
        Ok(age) => age < ttl,
        Err(_) => true,
    }
}
