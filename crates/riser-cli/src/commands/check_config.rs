//! 설정 점검.

use tracing::warn;

use riser_core::AppConfig;

/// 설정 경고를 출력하고 반환합니다.
pub fn run(config: &AppConfig) -> Vec<String> {
    let warnings = config.validate();

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();
    for name in names {
        if let Some(provider) = config.provider(name) {
            println!(
                "provider {:<16} {} (timeout {}ms, retries {})",
                name, provider.base_url, provider.timeout_ms, provider.max_retries
            );
        }
    }
    println!(
        "cache: max_size={} sweep={}ms namespace={} storage={}",
        config.cache.max_size,
        config.cache.sweep_interval_ms,
        config.cache.namespace,
        config
            .cache
            .storage_path
            .as_ref()
            .map_or_else(|| "memory".to_string(), |p| p.display().to_string())
    );

    for warning in &warnings {
        warn!("{}", warning);
        println!("⚠️  {}", warning);
    }
    if warnings.is_empty() {
        println!("✅ Configuration OK");
    }

    warnings
}
