//! Per-key cache with explicit expiry.
//!
//! Used to avoid re-fetching pipeline detail and commit detail within a short
//! window. A lookup never holds the lock across a fetch, so two callers racing
//! on the same cold key may both fetch and both insert; the last write wins.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// A cached value and the instant it stops being usable.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Usable iff `now` is strictly before the expiry.
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Mutex-guarded map of `K -> CacheEntry<V>`.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the live value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert or overwrite `key`, usable for `ttl` from now.
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.lock().insert(key, entry);
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        // Entries are plain data; a panic elsewhere cannot leave them torn.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_entry_present_until_expiry() {
        let cache: TtlCache<i64, String> = TtlCache::new();
        cache.put(1, "detail".to_string(), TTL);

        assert_eq!(cache.get(&1).as_deref(), Some("detail"));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get(&1).as_deref(), Some("detail"));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(cache.get(&1).is_some(), "still live just before T+t");
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_absent_from_expiry_onward() {
        let cache: TtlCache<i64, String> = TtlCache::new();
        cache.put(1, "detail".to_string(), TTL);

        tokio::time::advance(TTL).await;
        assert!(cache.get(&1).is_none(), "expired exactly at T+t");

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.get(&1).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites_expired_entry() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        cache.put("abc".to_string(), 1, TTL);
        tokio::time::advance(TTL).await;
        assert!(cache.get(&"abc".to_string()).is_none());

        cache.put("abc".to_string(), 2, TTL);
        assert_eq!(cache.get(&"abc".to_string()), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        assert!(cache.is_empty());
        assert!(cache.get(&"nope".to_string()).is_none());
    }
}
