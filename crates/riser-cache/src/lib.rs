//! 2단계 TTL 캐시.
//!
//! 이 crate는 다음을 제공합니다:
//! - 메모리 캐시: 크기 제한, 지연 만료 + 주기적 정리
//! - 영구 캐시: 호스트가 제공하는 키/값 저장소 위에 네임스페이스로 격리
//! - 하이브리드 캐시: 두 계층을 하나의 캐시로 조율 (읽기 시 승격)
//! - 데이터 종류별 TTL 표

pub mod clock;
pub mod durable;
pub mod entry;
pub mod error;
pub mod hybrid;
pub mod store;
pub mod ttl;
pub mod volatile;

pub use clock::{Clock, ManualClock, SystemClock};
pub use durable::{DurableCache, DurableStats};
pub use entry::CacheEntry;
pub use error::{Result, StoreError};
pub use hybrid::{HybridCache, HybridStats};
pub use store::{DurableStore, FileStore, MemoryStore};
pub use ttl::TtlClass;
pub use volatile::{VolatileCache, VolatileConfig, VolatileStats};

/// 정규식 타입 재내보내기 (패턴 무효화 인자).
pub use regex::Regex;
