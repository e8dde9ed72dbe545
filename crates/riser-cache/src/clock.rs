//! 캐시 타임스탬프용 시계.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// 밀리초 단위 epoch 시각을 제공하는 시계.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 현재 시각 (Unix epoch 밀리초).
    fn now_ms(&self) -> i64;
}

/// 시스템 벽시계.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// 수동으로 진행시키는 시계 (테스트, 시뮬레이션용).
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// 주어진 시각에서 시작하는 시계를 생성합니다.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// 시각을 앞으로 진행시킵니다.
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }

    /// 시각을 지정합니다.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
