//! 캐시 우선 데이터 조회.
//!
//! 하이브리드 캐시를 먼저 확인하고, 완전 미스일 때만 업스트림을 호출한 뒤
//! 결과를 데이터 종류별 TTL로 다시 캐시에 씁니다.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use riser_cache::{HybridCache, TtlClass};

use crate::client::{ApiClient, RequestOptions};
use crate::error::{FetchError, FetchResult};

/// 캐시 + 클라이언트 조합.
#[derive(Clone)]
pub struct CachedFetcher {
    cache: Arc<HybridCache<Value>>,
    client: ApiClient,
}

impl CachedFetcher {
    /// 새 조회기를 생성합니다.
    pub fn new(cache: Arc<HybridCache<Value>>, client: ApiClient) -> Self {
        Self { cache, client }
    }

    /// 캐시.
    pub fn cache(&self) -> &Arc<HybridCache<Value>> {
        &self.cache
    }

    /// 업스트림 클라이언트.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// 캐시된 값을 반환하거나, 없으면 `endpoint`를 GET으로 조회해 캐시합니다.
    ///
    /// 캐시된 값이 `T`로 변환되지 않으면 해당 키를 무효화하고 다시 조회합니다.
    /// 조회 결과가 `T`로 변환되지 않으면 캐시에 쓰지 않고 `MalformedResponse`.
    pub async fn get_or_fetch<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: TtlClass,
        persist: bool,
        endpoint: &str,
        options: RequestOptions,
    ) -> FetchResult<T> {
        if let Some(cached) = self.cache.get(key) {
            match serde_json::from_value(cached) {
                Ok(data) => {
                    debug!(key = key, "Serving from cache");
                    return Ok(data);
                }
                Err(e) => {
                    warn!(key = key, error = %e, "Cached value has unexpected shape, refetching");
                    self.cache.invalidate(key);
                }
            }
        }

        let value: Value = self.client.get(endpoint, options).await?;
        let data = serde_json::from_value(value.clone()).map_err(|e| {
            FetchError::MalformedResponse(format!("Unexpected response shape: {}", e))
        })?;

        self.cache.set(key, value, ttl.ttl(), persist);
        debug!(key = key, ttl = %ttl, persist = persist, "Fetched and cached");
        Ok(data)
    }
}
