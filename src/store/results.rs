//! TTL-bounded result store.
//!
//! The result store is the only shared mutable resource between the
//! execute and synthesize phases: each research thread writes exactly one
//! whole-value record under `{execution_id}:{thread_index}`, and synthesis
//! reads each key once, shortening its TTL rather than deleting so a late
//! inspection can still see the record. Unclaimed records expire naturally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::Result;

/// Build the result-store key for one research thread.
pub fn thread_result_key(execution_id: &str, thread_index: usize) -> String {
    format!("{}:{}", execution_id, thread_index)
}

/// Statistics for result store monitoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultStoreStats {
    /// Number of reads that found a live entry.
    pub hits: u64,
    /// Number of reads that found nothing (absent or expired).
    pub misses: u64,
    /// Number of live entries.
    pub entry_count: usize,
}

/// Abstract TTL-bounded key/value handoff store.
///
/// Writes are append/overwrite per distinct key, never partial-field
/// mutation, so no read-modify-write races are possible. Implementations
/// must never assume in-process memory sharing with their callers.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store a value under `key`, replacing any previous value, expiring
    /// after `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Option<String>;

    /// Reset the TTL of an existing key. A no-op for absent keys.
    async fn expire(&self, key: &str, new_ttl: Duration) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoreEntry {
    value: String,
    expires_at: Instant,
}

impl StoreEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// In-memory result store.
///
/// Thread-safe via `parking_lot::RwLock`; expired entries are dropped
/// lazily on read and can be swept with [`MemoryResultStore::cleanup_expired`].
#[derive(Default)]
pub struct MemoryResultStore {
    entries: RwLock<HashMap<String, StoreEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all expired entries.
    pub fn cleanup_expired(&self) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| !entry.is_expired());
    }

    /// Number of entries currently held, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current hit/miss/entry statistics.
    pub fn stats(&self) -> ResultStoreStats {
        ResultStoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.read().len(),
        }
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = StoreEntry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Entry exists but expired; drop it under the write lock.
        let mut entries = self.entries.write();
        if entries.get(key).map(|e| e.is_expired()).unwrap_or(false) {
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn expire(&self, key: &str, new_ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Instant::now() + new_ttl;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_result_key_format() {
        assert_eq!(thread_result_key("exec-1", 0), "exec-1:0");
        assert_eq!(thread_result_key("exec-1", 12), "exec-1:12");
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryResultStore::new();
        store
            .put("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        assert_eq!(store.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_get_absent_key() {
        let store = MemoryResultStore::new();
        assert!(store.get("missing").await.is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_put_overwrites_whole_value() {
        let store = MemoryResultStore::new();
        store.put("k", "old", Duration::from_secs(60)).await.unwrap();
        store.put("k", "new", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.as_deref(), Some("new"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let store = MemoryResultStore::new();
        store.put("k", "v", Duration::from_nanos(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(store.get("k").await.is_none());
        // The expired entry was dropped on read.
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expire_shortens_ttl() {
        let store = MemoryResultStore::new();
        store.put("k", "v", Duration::from_secs(3600)).await.unwrap();
        store.expire("k", Duration::from_nanos(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(store.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_expire_absent_key_is_noop() {
        let store = MemoryResultStore::new();
        store.expire("nope", Duration::from_secs(1)).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired_sweeps() {
        let store = MemoryResultStore::new();
        store.put("a", "1", Duration::from_nanos(1)).await.unwrap();
        store.put("b", "2", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        store.cleanup_expired();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("b").await.as_deref(), Some("2"));
    }
}
