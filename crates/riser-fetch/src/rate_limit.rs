//! 업스트림별 rate limit 관찰.
//!
//! 응답 헤더에서 남은 요청 수를 읽어 최신 값만 보관합니다. 요청을 막거나
//! 지연시키지 않는 수동 추적기입니다.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::debug;

/// 남은 요청 수 헤더.
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// 전체 한도 헤더.
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// 초기화 시각 헤더 (epoch 초).
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// 관찰된 rate limit 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    /// 남은 요청 수
    pub remaining: u64,
    /// 전체 한도 (헤더 없으면 0)
    pub limit: u64,
    /// 한도 초기화 시각 (헤더 없으면 관찰 시각)
    pub reset_at: DateTime<Utc>,
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

impl RateLimitSnapshot {
    /// 응답 헤더에서 스냅샷을 만듭니다.
    ///
    /// `x-ratelimit-remaining`이 없으면 `None`.
    pub fn from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Self> {
        let remaining = header_u64(headers, HEADER_REMAINING)?;
        let limit = header_u64(headers, HEADER_LIMIT).unwrap_or(0);
        let reset_at = header_u64(headers, HEADER_RESET)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(now);

        Some(Self {
            remaining,
            limit,
            reset_at,
        })
    }

    /// 한도를 모두 사용했는지 확인.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// 업스트림 이름 → 최신 스냅샷.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    snapshots: RwLock<HashMap<String, RateLimitSnapshot>>,
}

impl RateLimitTracker {
    /// 빈 추적기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 스냅샷을 기록합니다 (마지막 기록 우선).
    pub fn observe(&self, upstream: &str, snapshot: RateLimitSnapshot) {
        debug!(
            upstream = upstream,
            remaining = snapshot.remaining,
            limit = snapshot.limit,
            reset_at = %snapshot.reset_at,
            "Rate limit observed"
        );
        self.snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(upstream.to_string(), snapshot);
    }

    /// 업스트림의 최신 스냅샷.
    pub fn get(&self, upstream: &str) -> Option<RateLimitSnapshot> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(upstream)
            .copied()
    }

    /// 모든 업스트림의 최신 스냅샷 (이름순).
    pub fn snapshots(&self) -> Vec<(String, RateLimitSnapshot)> {
        let mut all: Vec<_> = self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, snapshot)| (name.clone(), *snapshot))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
