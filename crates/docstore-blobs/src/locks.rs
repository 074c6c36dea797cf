//! Per-document lock registry
//!
//! Serializes save/delete/disk-serve operations on the same document id
//! while letting operations on distinct ids proceed concurrently. Lock
//! entries are reference counted: when the last holder releases an id's
//! lock and nobody is waiting for it, the entry is dropped from the
//! table, so the registry does not grow with the document universe.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Clone, Default)]
pub struct LockRegistry {
    table: LockTable,
}

/// Exclusive guard for one document id. Released on drop.
pub struct BlobGuard {
    table: LockTable,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for `id`, creating it on first access.
    ///
    /// Lookup-or-create happens atomically under the table lock, so two
    /// callers racing on a fresh id end up contending on the same mutex.
    pub async fn acquire(&self, id: &str) -> BlobGuard {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table
                .entry(id.to_owned())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        BlobGuard {
            table: self.table.clone(),
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for BlobGuard {
    fn drop(&mut self) {
        // Release the mutex before inspecting the table, so our guard's
        // clone of the Arc is gone when we count holders.
        self.guard.take();

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = table.get(&self.id) {
            // Acquirers clone the Arc under the table lock, so a count of
            // one means the table holds the only reference.
            if Arc::strong_count(lock) == 1 {
                table.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_is_exclusive() {
        let registry = LockRegistry::new();
        let held = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let held = held.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire("doc-1").await;
                assert!(!held.swap(true, Ordering::SeqCst), "lock held twice");
                tokio::time::sleep(Duration::from_millis(5)).await;
                held.store(false, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_distinct_ids_do_not_block() {
        let registry = LockRegistry::new();
        let _guard_a = registry.acquire("doc-a").await;

        // Must complete while doc-a is still held.
        let registry2 = registry.clone();
        tokio::time::timeout(Duration::from_secs(1), async move {
            let _guard_b = registry2.acquire("doc-b").await;
        })
        .await
        .expect("acquiring an unrelated id blocked");
    }

    #[tokio::test]
    async fn test_registry_shrinks_after_release() {
        let registry = LockRegistry::new();
        {
            let _a = registry.acquire("doc-a").await;
            let _b = registry.acquire("doc-b").await;
            assert_eq!(registry.len(), 2);
        }
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_waiter_queued() {
        let registry = LockRegistry::new();
        let guard = registry.acquire("doc-a").await;

        let registry2 = registry.clone();
        let waiter = tokio::spawn(async move {
            let _guard = registry2.acquire("doc-a").await;
        });

        // Give the waiter time to queue up, then release.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        waiter.await.unwrap();
        assert_eq!(registry.len(), 0);
    }
}
