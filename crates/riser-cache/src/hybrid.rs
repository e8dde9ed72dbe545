//! 하이브리드 캐시.
//!
//! 메모리 계층과 영구 계층을 하나의 논리 캐시로 묶습니다. 자체적으로 데이터를
//! 소유하지 않고 두 계층 사이의 읽기/쓰기/무효화만 조율합니다.
//!
//! ```text
//! get ──> memory ──hit──> 반환
//!           │miss
//!           v
//!         durable ──hit──> memory로 승격 ──> 반환
//!           │miss
//!           v
//!          None (네트워크 조회는 호출자 책임)
//! ```

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use riser_core::CacheConfig;

use crate::clock::{Clock, SystemClock};
use crate::durable::{DurableCache, DurableStats};
use crate::store::{DurableStore, MemoryStore};
use crate::ttl;
use crate::volatile::{VolatileCache, VolatileConfig, VolatileStats};

/// 계층별 통계.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HybridStats {
    pub memory: VolatileStats,
    pub storage: DurableStats,
}

/// 메모리 + 영구 2단계 캐시.
pub struct HybridCache<V> {
    memory: VolatileCache<V>,
    storage: DurableCache,
    promotion_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V> HybridCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    /// 두 계층으로 하이브리드 캐시를 구성하고 메모리 정리 태스크를 시작합니다.
    pub fn new(
        memory: VolatileCache<V>,
        storage: DurableCache,
        promotion_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        memory.start_sweeper();
        Self {
            memory,
            storage,
            promotion_ttl,
            clock,
        }
    }

    /// 설정값으로 구성합니다.
    pub fn from_config(
        config: &CacheConfig,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let memory = VolatileCache::new(VolatileConfig::from(config), clock.clone());
        let storage = DurableCache::new(store, config.namespace.clone(), clock.clone());
        Self::new(
            memory,
            storage,
            Duration::from_millis(config.promotion_ttl_ms),
            clock,
        )
    }

    /// 프로세스 메모리 저장소와 시스템 시계로 구성합니다 (뉴스 TTL로 승격).
    pub fn in_memory() -> Self {
        Self::new(
            VolatileCache::with_defaults(),
            DurableCache::with_store(Arc::new(MemoryStore::new())),
            ttl::NEWS,
            Arc::new(SystemClock),
        )
    }

    /// 값을 조회합니다.
    ///
    /// 영구 계층에서 찾은 값은 메모리로 승격됩니다. 승격 TTL은 기본 승격 TTL과
    /// 영구 항목의 남은 수명 중 짧은 쪽입니다.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.memory.get(key) {
            debug!(key = key, tier = "memory", "Cache hit");
            return Some(value);
        }

        let entry = self.storage.get_entry::<V>(key)?;
        let ttl = self
            .promotion_ttl
            .min(entry.remaining(self.clock.now_ms()));
        self.memory.set(key, entry.data.clone(), ttl);
        debug!(key = key, tier = "storage", ttl_ms = ttl.as_millis() as u64, "Cache hit, promoted");

        Some(entry.data)
    }

    /// 값을 저장합니다. `persist`가 참이면 영구 계층에도 기록합니다.
    pub fn set(&self, key: &str, data: V, ttl: Duration, persist: bool) {
        if persist {
            self.storage.set(key, &data, ttl);
        }
        self.memory.set(key, data, ttl);
    }

    /// 메모리 계층에만 저장합니다.
    pub fn set_memory(&self, key: &str, data: V, ttl: Duration) {
        self.memory.set(key, data, ttl);
    }

    /// 영구 계층에만 저장합니다.
    pub fn set_storage(&self, key: &str, data: &V, ttl: Duration) {
        self.storage.set(key, data, ttl);
    }

    /// 어느 계층에든 유효한 항목이 있는지 확인합니다.
    pub fn has(&self, key: &str) -> bool {
        self.memory.has(key) || self.storage.has(key)
    }

    /// 두 계층에서 키를 삭제합니다.
    pub fn invalidate(&self, key: &str) {
        self.memory.invalidate(key);
        self.storage.invalidate(key);
    }

    /// 두 계층에서 패턴과 일치하는 키를 삭제하고 계층별 삭제 수를 반환합니다.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> (usize, usize) {
        let memory = self.memory.invalidate_pattern(pattern);
        let storage = self.storage.invalidate_pattern(pattern);
        debug!(pattern = %pattern, memory = memory, storage = storage, "Cache pattern invalidated");
        (memory, storage)
    }

    /// 두 계층을 모두 비웁니다.
    pub fn clear(&self) {
        self.memory.clear();
        self.storage.clear();
    }

    /// 메모리 계층만 비웁니다.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    /// 영구 계층만 비웁니다.
    pub fn clear_storage(&self) {
        self.storage.clear();
    }

    /// 계층별 통계.
    pub fn stats(&self) -> HybridStats {
        HybridStats {
            memory: self.memory.stats(),
            storage: self.storage.stats(),
        }
    }

    /// 메모리 계층 정리 태스크를 멈춥니다.
    pub fn destroy(&self) {
        self.memory.stop_sweeper();
    }

    /// 메모리 계층.
    pub fn memory(&self) -> &VolatileCache<V> {
        &self.memory
    }

    /// 영구 계층.
    pub fn storage(&self) -> &DurableCache {
        &self.storage
    }
}
