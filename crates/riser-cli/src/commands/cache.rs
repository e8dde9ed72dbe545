//! 캐시 관리 명령 (stats, invalidate, clear).

use anyhow::{Context, Result};

use riser_cache::{HybridStats, Regex};
use riser_core::CacheConfig;

use super::open_cache;

/// 계층별 통계를 JSON으로 출력합니다.
pub fn stats(config: &CacheConfig) -> Result<HybridStats> {
    let cache = open_cache(config)?;
    let stats = cache.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(stats)
}

/// 패턴과 일치하는 키를 두 계층에서 삭제합니다.
pub fn invalidate(config: &CacheConfig, pattern: &str) -> Result<(usize, usize)> {
    let regex = Regex::new(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))?;
    let cache = open_cache(config)?;

    let (memory, storage) = cache.invalidate_pattern(&regex);
    println!("Invalidated {} memory / {} storage entries", memory, storage);
    Ok((memory, storage))
}

/// 두 계층을 모두 비웁니다.
pub fn clear(config: &CacheConfig) -> Result<()> {
    let cache = open_cache(config)?;
    let before = cache.stats().storage.count;
    cache.clear();
    println!("Cleared {} stored entries", before);
    Ok(())
}
