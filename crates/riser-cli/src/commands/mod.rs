//! CLI 명령어 구현 모듈.

pub mod cache;
pub mod check_config;
pub mod fetch;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use riser_cache::{DurableStore, FileStore, HybridCache, MemoryStore, SystemClock};
use riser_core::CacheConfig;

/// 설정에 따라 하이브리드 캐시를 엽니다.
///
/// `storage_path`가 없으면 영구 계층도 프로세스 메모리에 둡니다.
pub fn open_cache(config: &CacheConfig) -> Result<HybridCache<Value>> {
    let store: Arc<dyn DurableStore> = match &config.storage_path {
        Some(path) => Arc::new(
            FileStore::open(path, Some(config.storage_quota_bytes))
                .with_context(|| format!("Failed to open cache file {}", path.display()))?,
        ),
        None => {
            warn!("cache.storage_path not set; durable tier will not outlive this process");
            Arc::new(MemoryStore::with_quota(config.storage_quota_bytes))
        }
    };

    Ok(HybridCache::from_config(config, store, Arc::new(SystemClock)))
}
