//! Ephemeral, TTL'd state: rate limits, idempotency locks, short-lived
//! session data, and the per-`(content_hash, size)` generation lock the
//! thumbnail pipeline uses to stop a cache stampede. Backed by `moka`, an
//! in-process cache -- if this core is ever run as more than one process,
//! this trait's impl is the seam to swap in something shared (Redis and
//! friends), not the call sites.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache as MokaCacheImpl;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Set only if `key` is absent; `true` if this call won the race.
    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool;

    /// Acquire a short-lived mutual-exclusion lock on `key`. `true` if this
    /// call won it; the lock releases itself on `ttl` expiry -- there is no
    /// explicit unlock, since the callers here (thumbnail generation,
    /// idempotent job dispatch) hold it only for the duration of work
    /// bounded well under `ttl`.
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> bool;

    /// `true` if fewer than `max` calls have been made for `key` within
    /// the trailing `window`.
    async fn rate_limit(&self, key: &str, max: u64, window: Duration) -> bool;

    async fn get_many(&self, keys: &[String]) -> Vec<Option<Vec<u8>>>;
}

struct RateWindow {
    count: u64,
    window_start: std::time::Instant,
}

/// `moka`-backed implementation. Rate limiting is a fixed window (not
/// sliding): `count` resets whenever `window` has elapsed since
/// `window_start`, which is simpler than a sliding log and close enough
/// for the abuse-prevention role this plays.
pub struct MokaCache {
    values: MokaCacheImpl<String, Arc<Vec<u8>>>,
    locks: MokaCacheImpl<String, ()>,
    rates: Arc<std::sync::Mutex<std::collections::HashMap<String, RateWindow>>>,
}

impl MokaCache {
    pub fn new(max_capacity: u64) -> Self {
        MokaCache {
            values: MokaCacheImpl::new(max_capacity),
            locks: MokaCacheImpl::new(max_capacity),
            rates: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        }
    }
}

#[async_trait]
impl Cache for MokaCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.values.get(key).map(|v| (*v).clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.values.insert(key.to_string(), Arc::new(value));
        let values = self.values.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            values.invalidate(&key);
        });
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        if self.values.contains_key(key) {
            return false;
        }
        self.set(key, value, ttl).await;
        true
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> bool {
        if self.locks.contains_key(key) {
            return false;
        }
        self.locks.insert(key.to_string(), ());
        let locks = self.locks.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            locks.invalidate(&key);
        });
        true
    }

    async fn rate_limit(&self, key: &str, max: u64, window: Duration) -> bool {
        let mut rates = self.rates.lock().unwrap();
        let now = std::time::Instant::now();
        let entry = rates.entry(key.to_string()).or_insert_with(|| RateWindow { count: 0, window_start: now });
        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }
        if entry.count >= max {
            return false;
        }
        entry.count += 1;
        true
    }

    async fn get_many(&self, keys: &[String]) -> Vec<Option<Vec<u8>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await);
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn set_nx_only_wins_once() {
        let cache = MokaCache::new(100);
        assert!(cache.set_nx("k", b"a".to_vec(), Duration::from_secs(5)).await);
        assert!(!cache.set_nx("k", b"b".to_vec(), Duration::from_secs(5)).await);
        assert_eq!(cache.get("k").await, Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn rate_limit_resets_after_window() {
        let cache = MokaCache::new(100);
        assert!(cache.rate_limit("r", 1, Duration::from_millis(20)).await);
        assert!(!cache.rate_limit("r", 1, Duration::from_millis(20)).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.rate_limit("r", 1, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn acquire_lock_is_exclusive_until_ttl() {
        let cache = MokaCache::new(100);
        assert!(cache.acquire_lock("l", Duration::from_millis(20)).await);
        assert!(!cache.acquire_lock("l", Duration::from_millis(20)).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.acquire_lock("l", Duration::from_millis(20)).await);
    }
}
