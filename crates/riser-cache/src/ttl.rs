//! 데이터 종류별 TTL.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 시세 (30초)
pub const MARKET_QUOTE: Duration = Duration::from_millis(30_000);
/// 뉴스 (5분)
pub const NEWS: Duration = Duration::from_millis(300_000);
/// 과거 시계열 (1시간)
pub const HISTORICAL_DATA: Duration = Duration::from_millis(3_600_000);
/// 정적 참조 데이터 (24시간)
pub const STATIC_DATA: Duration = Duration::from_millis(86_400_000);
/// 사용자 데이터 (7일)
pub const USER_DATA: Duration = Duration::from_millis(604_800_000);

/// 데이터 종류에 따른 TTL 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlClass {
    /// 단기 시세
    Quote,
    /// 뉴스
    News,
    /// 과거 시계열
    Historical,
    /// 정적 참조 데이터
    Static,
    /// 사용자 범위 데이터
    User,
}

impl TtlClass {
    /// 분류에 해당하는 TTL.
    pub fn ttl(self) -> Duration {
        match self {
            TtlClass::Quote => MARKET_QUOTE,
            TtlClass::News => NEWS,
            TtlClass::Historical => HISTORICAL_DATA,
            TtlClass::Static => STATIC_DATA,
            TtlClass::User => USER_DATA,
        }
    }

    /// 모든 분류.
    pub fn all() -> [TtlClass; 5] {
        [
            TtlClass::Quote,
            TtlClass::News,
            TtlClass::Historical,
            TtlClass::Static,
            TtlClass::User,
        ]
    }
}

impl std::fmt::Display for TtlClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TtlClass::Quote => write!(f, "quote"),
            TtlClass::News => write!(f, "news"),
            TtlClass::Historical => write!(f, "historical"),
            TtlClass::Static => write!(f, "static"),
            TtlClass::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for TtlClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TtlClass::all()
            .into_iter()
            .find(|class| class.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown TTL class: {}", s))
    }
}
