//! Keyed mutex table granting exclusive access per layer identity.
//!
//! The same layer blob can appear under distinct relative paths across
//! images within one archive; the registry's `POST -> PATCH -> PUT` sequence
//! for a given blob must not race with itself, so every worker touching a
//! layer acquires this table's lock for that layer's identity key before
//! running the HEAD/POST/PATCH/PUT sequence. The second uploader for the
//! same blob then sees a `HEAD` hit and short-circuits.
//!
//! A table-level lock guards entry creation only; once a per-key handle is
//! published, acquiring it bypasses the table lock entirely.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Clone, Default)]
pub struct LayerLockTable {
    entries: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Holds the per-key lock for as long as the caller needs exclusive access.
/// Dropping it releases the lock.
pub struct LayerLockHandle(OwnedMutexGuard<()>);

impl LayerLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, creating its mutex lazily on first
    /// reference. Blocks (asynchronously) until the lock is free; there is
    /// no timeout.
    pub async fn acquire(&self, key: &str) -> LayerLockHandle {
        let mutex = self.mutex_for(key).await;
        LayerLockHandle(mutex.lock_owned().await)
    }

    async fn mutex_for(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(existing) = self.entries.read().await.get(key) {
            return existing.clone();
        }
        let mut table = self.entries.write().await;
        table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_serializes_across_tasks() {
        let table = LayerLockTable::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _lock = table.acquire("shared-layer").await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_run_concurrently() {
        let table = LayerLockTable::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..4 {
            let table = table.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(tokio::spawn(async move {
                let _lock = table.acquire(&format!("layer-{i}")).await;
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(max_concurrent.load(Ordering::SeqCst) > 1);
    }
}
