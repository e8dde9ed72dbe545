//! 메모리 캐시.
//!
//! 크기 제한이 있는 프로세스 내 TTL 캐시입니다.
//!
//! # 축출 정책
//!
//! 용량이 찬 상태에서 새 키를 넣으면 **기록 시각이 가장 오래된** 항목을 먼저 제거합니다.
//! 접근 순서(LRU)가 아니라 삽입 순서이며, `get`은 우선순위를 바꾸지 않습니다.
//!
//! # 만료
//!
//! - `get`/`has`: 만료된 항목을 그 자리에서 삭제 (지연 만료)
//! - 백그라운드 정리: `sweep_interval`마다 만료 항목 일괄 삭제

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use riser_core::CacheConfig;

use crate::clock::{Clock, SystemClock};
use crate::entry::CacheEntry;

/// 메모리 캐시 설정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolatileConfig {
    /// 최대 항목 수
    pub max_size: usize,
    /// 백그라운드 정리 주기 (0이면 정리 태스크를 띄우지 않음)
    pub sweep_interval: Duration,
}

impl Default for VolatileConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl From<&CacheConfig> for VolatileConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_size: config.max_size,
            sweep_interval: Duration::from_millis(config.sweep_interval_ms),
        }
    }
}

/// 메모리 캐시 통계.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolatileStats {
    /// 현재 항목 수 (아직 정리되지 않은 만료 항목 포함)
    pub size: usize,
    /// 최대 항목 수
    pub max_size: usize,
    /// 적중 횟수
    pub hits: u64,
    /// 미스 횟수
    pub misses: u64,
    /// 적중률 (0.0 ~ 1.0)
    pub hit_rate: f64,
}

#[derive(Debug)]
struct Slot<V> {
    entry: CacheEntry<V>,
    /// 동일 타임스탬프 간 삽입 순서
    seq: u64,
}

#[derive(Debug)]
struct Inner<V> {
    slots: HashMap<String, Slot<V>>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn purge_expired(&mut self, now_ms: i64) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.entry.is_live(now_ms));
        before - self.slots.len()
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| (slot.entry.written_at, slot.seq))
            .map(|(key, _)| key.clone())?;
        self.slots.remove(&oldest);
        Some(oldest)
    }
}

fn lock<V>(inner: &Mutex<Inner<V>>) -> MutexGuard<'_, Inner<V>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 크기 제한 메모리 캐시.
///
/// 모든 변경은 하나의 mutex 아래에서 일어나며 잠금 중에는 await하지 않습니다.
/// 값은 복제본으로 반환되므로 캐시 밖으로 내부 항목이 노출되지 않습니다.
pub struct VolatileCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
    config: VolatileConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl<V> VolatileCache<V>
where
    V: Clone + Send + 'static,
{
    /// 새 캐시를 생성합니다. 정리 태스크는 [`start_sweeper`](Self::start_sweeper)로 시작합니다.
    pub fn new(config: VolatileConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                slots: HashMap::new(),
                next_seq: 0,
            })),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    /// 기본 설정과 시스템 시계로 생성합니다.
    pub fn with_defaults() -> Self {
        Self::new(VolatileConfig::default(), Arc::new(SystemClock))
    }

    /// 값을 조회합니다. 만료된 항목은 삭제하고 `None`을 반환합니다.
    pub fn get(&self, key: &str) -> Option<V> {
        let found = self.lookup(key);
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// 유효한 항목이 있는지 확인합니다 (통계에 반영되지 않음).
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        let mut inner = lock(&self.inner);

        let slot = inner.slots.get(key)?;
        if slot.entry.is_live(now) {
            return Some(slot.entry.data.clone());
        }

        inner.slots.remove(key);
        debug!(key = key, "Volatile cache entry expired");
        None
    }

    /// 값을 저장합니다.
    ///
    /// 새 키이고 용량이 찼으면 가장 오래 전에 기록된 항목을 먼저 제거합니다.
    pub fn set(&self, key: impl Into<String>, data: V, ttl: Duration) {
        if self.config.max_size == 0 {
            return;
        }

        let key = key.into();
        let now = self.clock.now_ms();
        let mut inner = lock(&self.inner);

        if !inner.slots.contains_key(&key) {
            while inner.slots.len() >= self.config.max_size {
                match inner.evict_oldest() {
                    Some(evicted) => debug!(key = %evicted, "Volatile cache evicted oldest entry"),
                    None => break,
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.slots.insert(
            key,
            Slot {
                entry: CacheEntry::new(data, now, ttl),
                seq,
            },
        );
    }

    /// 키를 삭제합니다. 삭제되었으면 `true`.
    pub fn invalidate(&self, key: &str) -> bool {
        lock(&self.inner).slots.remove(key).is_some()
    }

    /// 패턴과 일치하는 모든 키를 삭제하고 삭제 개수를 반환합니다.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut inner = lock(&self.inner);
        let before = inner.slots.len();
        inner.slots.retain(|key, _| !pattern.is_match(key));
        before - inner.slots.len()
    }

    /// 모든 항목을 삭제합니다.
    pub fn clear(&self) {
        lock(&self.inner).slots.clear();
    }

    /// 만료된 항목을 모두 삭제하고 삭제 개수를 반환합니다.
    pub fn purge_expired(&self) -> usize {
        lock(&self.inner).purge_expired(self.clock.now_ms())
    }

    /// 물리적으로 보관 중인 항목 수 (정리 전 만료 항목 포함).
    pub fn len(&self) -> usize {
        lock(&self.inner).slots.len()
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 캐시 통계.
    pub fn stats(&self) -> VolatileStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        VolatileStats {
            size: self.len(),
            max_size: self.config.max_size,
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// 백그라운드 정리 태스크를 시작합니다.
    ///
    /// Tokio 런타임 안에서 호출해야 하며, 런타임이 없으면 지연 만료만 사용합니다.
    /// 이미 실행 중이면 아무것도 하지 않습니다.
    pub fn start_sweeper(&self) {
        if self.config.sweep_interval.is_zero() {
            return;
        }

        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No Tokio runtime; volatile cache relies on lazy expiry only");
                return;
            }
        };

        let token = CancellationToken::new();
        handle.spawn(sweep_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.clock),
            self.config.sweep_interval,
            token.clone(),
        ));
        *sweeper = Some(token);

        info!(
            interval_ms = self.config.sweep_interval.as_millis() as u64,
            "Volatile cache sweeper started"
        );
    }

    /// 백그라운드 정리 태스크를 멈춥니다. 이후 정리는 다시 실행되지 않습니다.
    pub fn stop_sweeper(&self) {
        let token = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// 정리 태스크가 실행 중인지 확인.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<V> Drop for VolatileCache<V> {
    fn drop(&mut self) {
        let token = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }
}

async fn sweep_loop<V>(
    inner: Weak<Mutex<Inner<V>>>,
    clock: Arc<dyn Clock>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // 첫 tick은 즉시 발생하므로 건너뜀
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let purged = lock(&inner).purge_expired(clock.now_ms());
                if purged > 0 {
                    debug!(purged = purged, "Volatile cache sweep removed expired entries");
                }
            }
        }
    }

    debug!("Volatile cache sweeper stopped");
}
