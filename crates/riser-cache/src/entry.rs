//! 캐시 항목.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// TTL이 붙은 캐시 항목.
///
/// 영구 저장소에는 `{"data": .., "writtenAt": <epoch ms>, "ttl": <ms>}` 형태로 저장됩니다.
/// `now < written_at + ttl`인 동안만 유효합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// 캐시된 값
    pub data: T,
    /// 기록 시각 (epoch 밀리초)
    pub written_at: i64,
    /// 유효 기간 (밀리초)
    pub ttl: u64,
}

impl<T> CacheEntry<T> {
    /// 새 항목을 생성합니다.
    pub fn new(data: T, written_at: i64, ttl: Duration) -> Self {
        Self {
            data,
            written_at,
            ttl: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// 만료 시각 (epoch 밀리초).
    pub fn expires_at(&self) -> i64 {
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        self.written_at.saturating_add(ttl)
    }

    /// 주어진 시각에 유효한지 확인.
    pub fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at()
    }

    /// 남은 유효 기간. 만료되었으면 0.
    pub fn remaining(&self, now_ms: i64) -> Duration {
        let left = self.expires_at().saturating_sub(now_ms).max(0);
        Duration::from_millis(left as u64)
    }
}
