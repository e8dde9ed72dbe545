//! 영구 캐시.
//!
//! [`DurableStore`] 위에 TTL 항목을 JSON으로 저장합니다. 모든 키는
//! `{namespace}:{key}` 형태이며 정리/패턴 삭제는 이 네임스페이스 밖의 키를 건드리지 않습니다.
//!
//! 저장소 오류는 모두 이 계층에서 흡수되어 캐시 미스로 처리됩니다.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::clock::{Clock, SystemClock};
use crate::entry::CacheEntry;
use crate::store::DurableStore;

/// 기본 네임스페이스.
pub const DEFAULT_NAMESPACE: &str = "early-riser-cache";

/// 영구 캐시 통계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurableStats {
    /// 네임스페이스 내 항목 수
    pub count: usize,
    /// 직렬화된 값의 총 크기 (바이트)
    pub size_estimate: usize,
}

/// 네임스페이스로 격리된 영구 TTL 캐시.
#[derive(Clone)]
pub struct DurableCache {
    store: Arc<dyn DurableStore>,
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl DurableCache {
    /// 새 영구 캐시를 생성합니다.
    pub fn new(store: Arc<dyn DurableStore>, namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            clock,
        }
    }

    /// 기본 네임스페이스와 시스템 시계로 생성합니다.
    pub fn with_store(store: Arc<dyn DurableStore>) -> Self {
        Self::new(store, DEFAULT_NAMESPACE, Arc::new(SystemClock))
    }

    /// 네임스페이스.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn logical_key<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        full_key.strip_prefix(self.namespace.as_str())?.strip_prefix(':')
    }

    /// 네임스페이스에 속한 (전체 키, 논리 키) 목록.
    fn namespaced_keys(&self) -> Vec<(String, String)> {
        self.store
            .keys()
            .into_iter()
            .filter_map(|full| {
                let logical = self.logical_key(&full)?.to_string();
                Some((full, logical))
            })
            .collect()
    }

    /// 값을 조회합니다.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.data)
    }

    /// 항목 전체(기록 시각, TTL 포함)를 조회합니다.
    ///
    /// 역직렬화에 실패한 레코드는 삭제하고 미스로 처리합니다.
    pub fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let full_key = self.full_key(key);
        let raw = self.store.get(&full_key)?;

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = key, error = %e, "Corrupt durable cache record removed");
                self.store.remove(&full_key);
                return None;
            }
        };

        if !entry.is_live(self.clock.now_ms()) {
            debug!(key = key, "Durable cache entry expired");
            self.store.remove(&full_key);
            return None;
        }

        Some(entry)
    }

    /// 값을 저장합니다 (best-effort).
    ///
    /// 용량 초과 시 만료 항목을 한 번 정리한 뒤 한 번만 다시 시도합니다.
    /// 두 번째 실패를 포함한 모든 오류는 로그만 남깁니다.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Duration) {
        let entry = CacheEntry::new(data, self.clock.now_ms(), ttl);
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to serialize durable cache entry");
                return;
            }
        };

        let full_key = self.full_key(key);
        match self.store.set(&full_key, &json) {
            Ok(()) => {}
            Err(e) if e.is_quota_exceeded() => {
                let purged = self.clear_expired();
                warn!(key = key, purged = purged, "Durable store quota exceeded, purged expired entries");

                if let Err(e) = self.store.set(&full_key, &json) {
                    error!(key = key, error = %e, "Failed to write durable cache entry after purge");
                }
            }
            Err(e) => {
                warn!(key = key, error = %e, "Failed to write durable cache entry");
            }
        }
    }

    /// 유효한 항목이 있는지 확인합니다.
    pub fn has(&self, key: &str) -> bool {
        self.get_entry::<IgnoredAny>(key).is_some()
    }

    /// 키를 삭제합니다.
    pub fn invalidate(&self, key: &str) {
        self.store.remove(&self.full_key(key));
    }

    /// 논리 키가 패턴과 일치하는 항목을 삭제하고 삭제 개수를 반환합니다.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let targets: Vec<String> = self
            .namespaced_keys()
            .into_iter()
            .filter(|(_, logical)| pattern.is_match(logical))
            .map(|(full, _)| full)
            .collect();

        self.store.remove_many(&targets);
        targets.len()
    }

    /// 네임스페이스 내 모든 항목을 삭제하고 삭제 개수를 반환합니다.
    pub fn clear(&self) -> usize {
        let targets: Vec<String> = self
            .namespaced_keys()
            .into_iter()
            .map(|(full, _)| full)
            .collect();

        self.store.remove_many(&targets);
        targets.len()
    }

    /// 만료되었거나 손상된 항목을 삭제하고 삭제 개수를 반환합니다.
    pub fn clear_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let targets: Vec<String> = self
            .namespaced_keys()
            .into_iter()
            .filter(|(full, _)| match self.store.get(full) {
                Some(raw) => serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw)
                    .map_or(true, |entry| !entry.is_live(now)),
                None => false,
            })
            .map(|(full, _)| full)
            .collect();

        self.store.remove_many(&targets);
        targets.len()
    }

    /// 캐시 통계.
    pub fn stats(&self) -> DurableStats {
        self.namespaced_keys()
            .iter()
            .fold(DurableStats { count: 0, size_estimate: 0 }, |mut stats, (full, _)| {
                stats.count += 1;
                stats.size_estimate += self.store.get(full).map_or(0, |raw| raw.len());
                stats
            })
    }
}

impl std::fmt::Debug for DurableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableCache")
            .field("namespace", &self.namespace)
            .field("store_len", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Quote {
        price: f64,
    }

    /// 개별 삭제와 일괄 삭제 호출 수를 세는 저장소.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        single_removes: AtomicUsize,
        batch_removes: AtomicUsize,
    }

    impl DurableStore for CountingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> crate::error::Result<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) {
            self.single_removes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove(key);
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn key(&self, index: usize) -> Option<String> {
            self.inner.key(index)
        }

        fn remove_many(&self, keys: &[String]) {
            self.batch_removes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove_many(keys);
        }
    }

    fn durable(store: Arc<MemoryStore>) -> (DurableCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (DurableCache::new(store, "ns", clock.clone()), clock)
    }

    #[test]
    fn test_set_get_and_expiry() {
        let store = Arc::new(MemoryStore::new());
        let (cache, clock) = durable(store.clone());

        cache.set("quote:AAPL", &Quote { price: 190.2 }, Duration::from_millis(30_000));
        assert_eq!(cache.get::<Quote>("quote:AAPL"), Some(Quote { price: 190.2 }));
        assert!(store.get("ns:quote:AAPL").is_some());

        clock.advance(Duration::from_millis(31_000));
        assert_eq!(cache.get::<Quote>("quote:AAPL"), None);
        assert!(store.get("ns:quote:AAPL").is_none());
    }

    #[test]
    fn test_corrupt_record_is_removed() {
        let store = Arc::new(MemoryStore::new());
        let (cache, _clock) = durable(store.clone());
        store.set("ns:broken", "{not json").unwrap();

        assert_eq!(cache.get::<Quote>("broken"), None);
        assert!(store.get("ns:broken").is_none());
    }

    #[test]
    fn test_namespace_isolation() {
        let store = Arc::new(MemoryStore::new());
        let (cache, _clock) = durable(store.clone());
        store.set("foreign:quote:AAPL", "keep").unwrap();
        store.set("ns2:quote:AAPL", "keep").unwrap();

        cache.set("quote:AAPL", &1, Duration::from_secs(60));
        cache.set("news:top", &2, Duration::from_secs(60));

        assert_eq!(cache.invalidate_pattern(&Regex::new("^quote:").unwrap()), 1);
        assert!(cache.has("news:top"));

        assert_eq!(cache.clear(), 1);
        assert_eq!(store.get("foreign:quote:AAPL").as_deref(), Some("keep"));
        assert_eq!(store.get("ns2:quote:AAPL").as_deref(), Some("keep"));
    }

    #[test]
    fn test_quota_exceeded_purges_expired_then_retries() {
        let store = Arc::new(MemoryStore::with_quota(200));
        let (cache, clock) = durable(store.clone());

        cache.set("old", &"x".repeat(100), Duration::from_millis(10));
        clock.advance(Duration::from_millis(20));

        // 두 항목이 동시에 들어갈 수 없는 크기
        cache.set("new", &"y".repeat(100), Duration::from_secs(60));

        assert!(store.get("ns:old").is_none());
        assert_eq!(cache.get::<String>("new"), Some("y".repeat(100)));
    }

    #[test]
    fn test_second_quota_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::with_quota(50));
        let (cache, _clock) = durable(store.clone());

        cache.set("huge", &"z".repeat(500), Duration::from_secs(60));

        assert_eq!(cache.get::<String>("huge"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_expired_and_stats() {
        let store = Arc::new(MemoryStore::new());
        let (cache, clock) = durable(store.clone());
        store.set("ns:corrupt", "???").unwrap();
        store.set("other:key", "untouched").unwrap();

        cache.set("short", &1, Duration::from_millis(10));
        cache.set("long", &2, Duration::from_secs(60));
        clock.advance(Duration::from_millis(10));

        let before = cache.stats();
        assert_eq!(before.count, 3);
        assert!(before.size_estimate > 0);

        assert_eq!(cache.clear_expired(), 2);
        assert_eq!(cache.stats().count, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_bulk_removals_use_one_batch() {
        let store = Arc::new(CountingStore::default());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = DurableCache::new(store.clone(), "ns", clock.clone());

        for i in 0..20 {
            cache.set(&format!("quote:{i}"), &i, Duration::from_millis(10));
            cache.set(&format!("news:{i}"), &i, Duration::from_secs(60));
        }
        store.inner.set("other:key", "keep").unwrap();

        assert_eq!(cache.invalidate_pattern(&Regex::new("^quote:1").unwrap()), 11);
        clock.advance(Duration::from_millis(10));
        assert_eq!(cache.clear_expired(), 9);
        assert_eq!(cache.clear(), 20);

        assert_eq!(store.batch_removes.load(Ordering::SeqCst), 3);
        assert_eq!(store.single_removes.load(Ordering::SeqCst), 0);
        assert_eq!(store.keys(), vec!["other:key".to_string()]);
    }
}
