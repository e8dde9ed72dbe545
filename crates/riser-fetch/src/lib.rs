//! 업스트림 HTTP 요청 실행기.
//!
//! 불안정하고 요청 한도가 있는 데이터 제공자 호출을 예측 가능한 데이터 소스로 바꿉니다.
//!
//! - `error`: 실패 분류 ([`FetchError`])
//! - `backoff`: 지수 백오프 + 지터
//! - `retry`: 재시도 루프
//! - `rate_limit`: 업스트림별 rate limit 관찰
//! - `dedup`: 진행 중 동일 요청 공유
//! - `interceptor`: 관찰 훅
//! - `client`: 위 단계를 조합한 REST 클라이언트
//! - `cached`: 하이브리드 캐시 우선 조회

pub mod backoff;
pub mod cached;
pub mod client;
pub mod dedup;
pub mod error;
pub mod interceptor;
pub mod rate_limit;
pub mod retry;

pub use backoff::BackoffPolicy;
pub use cached::CachedFetcher;
pub use client::{ApiClient, ApiClientBuilder, RequestOptions, RetryPredicate};
pub use dedup::{request_key, RequestDeduplicator};
pub use error::{ErrorCode, FetchError, FetchResult};
pub use interceptor::{RequestInterceptor, TracingInterceptor};
pub use rate_limit::{RateLimitSnapshot, RateLimitTracker};
pub use retry::{with_retry, with_retry_if, RetryConfig};
