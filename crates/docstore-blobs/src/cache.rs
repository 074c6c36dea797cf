//! Bounded, expiring in-memory blob cache
//!
//! Keyed by document id. Bounded by two independent ceilings: a maximum
//! entry count and a maximum aggregate byte size of cached data. Entries
//! expire after a fixed TTL, checked lazily at lookup time. Eviction is
//! creation-order (oldest entry first), driven by an insertion-ordered
//! queue paired with the map so each eviction is O(1) amortized rather
//! than a scan over all entries.

use crate::types::{CacheStats, CachedBlob};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

struct CacheInner {
    entries: HashMap<String, CachedBlob>,
    /// Insertion order for eviction. Slots whose timestamp no longer
    /// matches the live entry are stale and skipped during eviction.
    order: VecDeque<(String, DateTime<Utc>)>,
    /// Slots in `order` currently known to be stale. Once these outnumber
    /// the live entries the queue is compacted, so deletes and overwrites
    /// that never trip a ceiling cannot grow it without bound.
    stale_slots: usize,
    /// Sum of `size` over entries currently holding data.
    data_bytes: u64,
}

impl CacheInner {
    fn remove_entry(&mut self, id: &str) -> Option<CachedBlob> {
        let entry = self.entries.remove(id)?;
        self.data_bytes -= entry.data.as_ref().map(|d| d.len() as u64).unwrap_or(0);
        self.note_stale_slot();
        Some(entry)
    }

    fn note_stale_slot(&mut self) {
        self.stale_slots += 1;
        if self.stale_slots > self.entries.len() {
            let entries = &self.entries;
            self.order.retain(|(id, created_at)| {
                entries
                    .get(id)
                    .is_some_and(|entry| entry.created_at == *created_at)
            });
            self.stale_slots = 0;
        }
    }
}

pub struct BlobCache {
    inner: Arc<RwLock<CacheInner>>,
    max_entries: usize,
    max_bytes: u64,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlobCache {
    pub fn new(max_entries: usize, max_bytes: u64, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                stale_slots: 0,
                data_bytes: 0,
            })),
            max_entries,
            max_bytes,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up an entry by document id.
    ///
    /// Expired entries report a miss; their removal happens on a spawned
    /// task rather than under the shared read lock, so concurrent readers
    /// are never blocked by expiry cleanup.
    pub async fn get(&self, id: &str) -> Option<CachedBlob> {
        let expired_at = {
            let inner = self.inner.read().await;
            match inner.entries.get(id) {
                Some(entry) if !self.is_expired(entry) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.clone());
                }
                Some(entry) => Some(entry.created_at),
                None => None,
            }
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(created_at) = expired_at {
            self.schedule_removal(id.to_owned(), created_at);
        }
        None
    }

    /// Insert or replace the entry for `id`.
    ///
    /// An entry whose data alone exceeds the byte ceiling is rejected
    /// outright. Otherwise the oldest entries are evicted one at a time
    /// until both ceilings admit the new entry.
    pub async fn store(&self, id: &str, entry: CachedBlob) {
        let incoming_bytes = entry.data.as_ref().map(|d| d.len() as u64).unwrap_or(0);
        if incoming_bytes > self.max_bytes {
            debug!(id, size = incoming_bytes, "Blob too large for cache, skipping");
            return;
        }

        let mut inner = self.inner.write().await;

        // Replacing an existing entry frees its slot and bytes first; the
        // old order slot goes stale and is skipped at eviction time.
        inner.remove_entry(id);

        while inner.entries.len() + 1 > self.max_entries
            || inner.data_bytes + incoming_bytes > self.max_bytes
        {
            if !Self::evict_oldest(&mut inner) {
                break;
            }
        }

        inner.data_bytes += incoming_bytes;
        inner.order.push_back((id.to_owned(), entry.created_at));
        inner.entries.insert(id.to_owned(), entry);
    }

    /// Remove the entry for `id` if present.
    pub async fn delete(&self, id: &str) {
        let mut inner = self.inner.write().await;
        inner.remove_entry(id);
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            entries: inner.entries.len(),
            total_size: inner.data_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    async fn order_len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    fn is_expired(&self, entry: &CachedBlob) -> bool {
        (Utc::now() - entry.created_at)
            .to_std()
            .map(|age| age > self.ttl)
            .unwrap_or(false)
    }

    /// Drop the oldest live entry. Returns false when nothing is left to
    /// evict (only stale order slots remained).
    fn evict_oldest(inner: &mut CacheInner) -> bool {
        while let Some((id, created_at)) = inner.order.pop_front() {
            let matches = inner
                .entries
                .get(&id)
                .is_some_and(|entry| entry.created_at == created_at);
            if matches {
                // The live slot was just popped, so this removal leaves
                // nothing stale behind.
                if let Some(entry) = inner.entries.remove(&id) {
                    inner.data_bytes -= entry.data.as_ref().map(|d| d.len() as u64).unwrap_or(0);
                    debug!(id = %id, "Evicted oldest cache entry");
                }
                return true;
            }
            inner.stale_slots = inner.stale_slots.saturating_sub(1);
        }
        false
    }

    fn schedule_removal(&self, id: String, created_at: DateTime<Utc>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut inner = inner.write().await;
            let matches = inner
                .entries
                .get(&id)
                .is_some_and(|entry| entry.created_at == created_at);
            if matches {
                inner.remove_entry(&id);
                debug!(id = %id, "Removed expired cache entry");
            }
        });
    }
}
