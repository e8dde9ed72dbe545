//! 재시도 루프.

use std::future::Future;

use tracing::{debug, warn};

use riser_core::ProviderConfig;

use crate::backoff::BackoffPolicy;
use crate::error::{FetchError, FetchResult};

/// 재시도 설정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (총 시도 = max_retries + 1)
    pub max_retries: u32,
    /// 시도 간 대기 정책
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl From<&ProviderConfig> for RetryConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: BackoffPolicy::from(&config.backoff),
        }
    }
}

/// 재시도 가능한 에러면 백오프 후 다시 시도합니다.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    with_retry_if(config, |_| true, operation).await
}

/// 에러가 재시도 가능하고 `should_retry`도 승인할 때만 다시 시도합니다.
///
/// 마지막 시도의 에러는 그대로 반환됩니다.
pub async fn with_retry_if<T, F, Fut, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
    P: Fn(&FetchError) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= config.max_retries || !e.is_retryable() || !should_retry(&e) {
                    return Err(e);
                }

                let delay = config.backoff.delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    code = %e.code(),
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
