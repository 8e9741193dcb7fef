//! Result caching: memoize extracted records by archive identifier.
//!
//! ## Expiry
//!
//! Entries carry their own expiry instant. A lookup past expiry is a miss
//! and evicts the entry it found.
//!
//! ## LRU eviction
//!
//! When the cache holds `max_entries`, inserting a new identifier first drops
//! expired entries; if none are expired, the least-recently-accessed entry is
//! evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::types::ExtractedRecord;

/// Cache entry with metadata.
struct CacheEntry {
    record: ExtractedRecord,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
    /// Milliseconds since the cache's epoch (for LRU).
    last_accessed: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory record cache shared by all workers.
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    max_entries: usize,
    epoch: Instant,
}

impl ResultCache {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_entries: max_entries.max(1),
            epoch: Instant::now(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a fresh record for `archive_id`.
    pub fn get(&self, archive_id: &str) -> Option<ExtractedRecord> {
        self.get_at(archive_id, Instant::now())
    }

    /// Lookup against an explicit clock reading.
    pub fn get_at(&self, archive_id: &str, now: Instant) -> Option<ExtractedRecord> {
        {
            let entries = self.read();
            let entry = entries.get(archive_id)?;
            if !entry.is_expired(now) {
                entry
                    .last_accessed
                    .store(self.millis_since_epoch(now), Ordering::Relaxed);
                return Some(entry.record.clone());
            }
        }

        // Expired: evict, unless another writer refreshed it meanwhile.
        let mut entries = self.write();
        if entries
            .get(archive_id)
            .is_some_and(|entry| entry.is_expired(now))
        {
            entries.remove(archive_id);
            tracing::debug!(archive_id, "evicted expired cache entry");
        }
        None
    }

    /// Cache `record` under `archive_id` with the default TTL.
    pub fn insert(&self, archive_id: &str, record: ExtractedRecord) {
        self.put(archive_id, record, self.default_ttl);
    }

    /// Cache `record` under `archive_id`, overwriting any existing entry.
    pub fn put(&self, archive_id: &str, record: ExtractedRecord, ttl: Duration) {
        self.put_at(archive_id, record, ttl, Instant::now());
    }

    pub fn put_at(&self, archive_id: &str, record: ExtractedRecord, ttl: Duration, now: Instant) {
        let mut entries = self.write();
        if entries.len() >= self.max_entries && !entries.contains_key(archive_id) {
            self.evict(&mut entries, now);
        }
        entries.insert(
            archive_id.to_string(),
            CacheEntry {
                record,
                expires_at: now.checked_add(ttl),
                last_accessed: AtomicU64::new(self.millis_since_epoch(now)),
            },
        );
    }

    /// Remove a cached record.
    pub fn invalidate(&self, archive_id: &str) -> bool {
        self.write().remove(archive_id).is_some()
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of cached records (including expired).
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn evict(&self, entries: &mut HashMap<String, CacheEntry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        if entries.len() < before {
            return;
        }

        if let Some(lru) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed.load(Ordering::Relaxed))
            .map(|(id, _)| id.clone())
        {
            tracing::info!("evicting LRU cache entry: {lru}");
            entries.remove(&lru);
        }
    }

    fn millis_since_epoch(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str) -> ExtractedRecord {
        ExtractedRecord {
            archive_id: id.to_string(),
            original_url: format!("https://x.com/u/status/{id}"),
            archived_at: None,
            content_published_at: None,
            source_id: None,
            extracted_at: Utc::now(),
            document_hash: "00".into(),
        }
    }

    #[test]
    fn test_cache_roundtrip() {
        let cache = ResultCache::new(Duration::from_secs(3600), 10);
        assert!(cache.get("a").is_none());
        let r = record("a");
        cache.insert("a", r.clone());
        assert_eq!(cache.get("a"), Some(r));
    }

    #[test]
    fn test_expired_lookup_is_miss_and_evicts() {
        let cache = ResultCache::new(Duration::from_secs(86_400), 10);
        let t0 = Instant::now();
        cache.put_at("a", record("a"), Duration::from_secs(86_400), t0);

        assert!(cache.get_at("a", t0 + Duration::from_secs(86_399)).is_some());
        assert!(cache
            .get_at("a", t0 + Duration::from_secs(86_401))
            .is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ResultCache::new(Duration::from_secs(3600), 10);
        cache.insert("a", record("a"));
        let mut newer = record("a");
        newer.original_url = "https://x.com/u/status/999".into();
        cache.insert("a", newer.clone());
        assert_eq!(cache.get("a").unwrap().original_url, newer.original_url);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidation() {
        let cache = ResultCache::new(Duration::from_secs(3600), 10);
        cache.insert("a", record("a"));
        assert!(cache.invalidate("a"));
        assert!(cache.get("a").is_none());
        assert!(!cache.invalidate("a"));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResultCache::new(Duration::from_secs(3600), 3);
        let t0 = Instant::now();
        cache.put_at("a", record("a"), Duration::from_secs(3600), t0);
        cache.put_at("b", record("b"), Duration::from_secs(3600), t0 + Duration::from_secs(1));
        cache.put_at("c", record("c"), Duration::from_secs(3600), t0 + Duration::from_secs(2));

        // Touch a so b becomes least recently used.
        assert!(cache.get_at("a", t0 + Duration::from_secs(3)).is_some());

        cache.put_at("d", record("d"), Duration::from_secs(3600), t0 + Duration::from_secs(4));
        assert_eq!(cache.len(), 3);
        let later = t0 + Duration::from_secs(5);
        assert!(cache.get_at("b", later).is_none());
        assert!(cache.get_at("a", later).is_some());
        assert!(cache.get_at("c", later).is_some());
        assert!(cache.get_at("d", later).is_some());
    }

    #[test]
    fn test_lru_evicts_expired_first() {
        let cache = ResultCache::new(Duration::from_secs(3600), 3);
        let t0 = Instant::now();
        cache.put_at("short", record("short"), Duration::from_secs(1), t0);
        cache.put_at("b", record("b"), Duration::from_secs(3600), t0);
        cache.put_at("c", record("c"), Duration::from_secs(3600), t0);

        cache.put_at("d", record("d"), Duration::from_secs(3600), t0 + Duration::from_secs(10));
        assert_eq!(cache.len(), 3);
        let later = t0 + Duration::from_secs(11);
        assert!(cache.get_at("short", later).is_none());
        assert!(cache.get_at("b", later).is_some());
        assert!(cache.get_at("c", later).is_some());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = ResultCache::new(Duration::from_secs(3600), 10);
        cache.put("a", record("a"), Duration::ZERO);
        cache.insert("b", record("b"));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_unbounded_ttl_does_not_overflow() {
        let cache = ResultCache::new(Duration::MAX, 10);
        let t0 = Instant::now();
        cache.insert("a", record("a"));
        cache.put_at("b", record("b"), Duration::MAX, t0);
        let later = t0 + Duration::from_secs(10 * 365 * 86_400);
        assert!(cache.get_at("a", later).is_some());
        assert!(cache.get_at("b", later).is_some());
        assert_eq!(cache.cleanup_expired(), 0);
    }
}
