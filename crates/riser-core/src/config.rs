//! 설정 관리.
//!
//! TOML 파일과 `RISER__` 접두사 환경 변수에서 애플리케이션 설정을 읽습니다.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use config::ConfigError;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// 업스트림 데이터 제공자 (이름 → 설정)
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 2단계 캐시 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// 메모리 캐시 최대 항목 수
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// 만료 항목 정리 주기 (밀리초)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// 영구 저장소 키 접두사
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// 영구 저장소 적중 시 메모리로 승격할 때의 TTL (밀리초)
    #[serde(default = "default_promotion_ttl_ms")]
    pub promotion_ttl_ms: u64,
    /// 영구 저장소 파일 경로 (없으면 프로세스 메모리)
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// 영구 저장소 용량 한도 (바이트)
    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: usize,
}

fn default_max_size() -> usize {
    100
}
fn default_sweep_interval_ms() -> u64 {
    60_000
}
fn default_namespace() -> String {
    "early-riser-cache".to_string()
}
fn default_promotion_ttl_ms() -> u64 {
    300_000 // 뉴스 TTL과 동일
}
fn default_storage_quota_bytes() -> usize {
    5 * 1024 * 1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            sweep_interval_ms: default_sweep_interval_ms(),
            namespace: default_namespace(),
            promotion_ttl_ms: default_promotion_ttl_ms(),
            storage_path: None,
            storage_quota_bytes: default_storage_quota_bytes(),
        }
    }
}

/// 업스트림 제공자 설정.
#[derive(Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// 논리적 제공자 이름 (rate limit 추적 키). 비어 있으면 base URL의 호스트를 사용합니다.
    #[serde(default)]
    pub name: String,
    /// REST API 기본 URL
    pub base_url: String,
    /// Bearer 인증 키
    #[serde(default)]
    pub api_key: Option<String>,
    /// 시도당 타임아웃 (밀리초)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 최대 재시도 횟수 (총 시도 = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 모든 요청에 붙는 기본 헤더
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 백오프 설정
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}

impl ProviderConfig {
    /// 기본값으로 제공자 설정을 생성합니다.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            headers: HashMap::new(),
            backoff: BackoffConfig::default(),
        }
    }

    /// API 키를 지정합니다.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// 최대 재시도 횟수를 지정합니다.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 시도당 타임아웃을 지정합니다.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// 기본 헤더를 추가합니다.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 백오프 설정을 지정합니다.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// 재시도 간 지수 백오프 설정.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackoffConfig {
    /// 기본 지연 (밀리초)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// 최대 지연 (밀리초, 지터 제외)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// 지터 범위 (밀리초)
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_jitter_ms() -> u64 {
    100
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수 예: `RISER__CACHE__MAX_SIZE=200`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("RISER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// 기본 경로(`config/default.toml`)에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load("config/default.toml")
    }

    /// 이름으로 제공자 설정을 조회합니다.
    ///
    /// 설정의 `name`이 비어 있으면 맵 키로 채워서 반환합니다.
    pub fn provider(&self, name: &str) -> Option<ProviderConfig> {
        self.providers.get(name).map(|p| {
            let mut provider = p.clone();
            if provider.name.is_empty() {
                provider.name = name.to_string();
            }
            provider
        })
    }

    /// 설정 경고 목록을 반환합니다.
    ///
    /// 치명적이지 않은 누락(키 미설정 등)을 사람이 읽을 수 있는 문장으로 돌려줍니다.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.providers.is_empty() {
            warnings.push("No upstream providers configured".to_string());
        }

        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        for name in names {
            let provider = &self.providers[name];
            if provider.base_url.trim().is_empty() {
                warnings.push(format!("Provider '{}' has an empty base_url", name));
            }
            if provider.api_key.as_deref().map_or(true, str::is_empty) {
                warnings.push(format!("Provider '{}' API key not configured", name));
            }
            if provider.timeout_ms == 0 {
                warnings.push(format!("Provider '{}' has a zero timeout", name));
            }
        }

        if self.cache.max_size == 0 {
            warnings.push("cache.max_size is 0; the memory tier will hold nothing".to_string());
        }
        if self.cache.sweep_interval_ms == 0 {
            warnings.push("cache.sweep_interval_ms is 0; background sweep disabled".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let cache = CacheConfig::default();
        assert_eq!(cache.max_size, 100);
        assert_eq!(cache.sweep_interval_ms, 60_000);
        assert_eq!(cache.namespace, "early-riser-cache");

        let provider = ProviderConfig::new("news", "https://newsapi.org/v2");
        assert_eq!(provider.timeout_ms, 30_000);
        assert_eq!(provider.max_retries, 3);
        assert_eq!(provider.backoff, BackoffConfig::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[cache]
max_size = 10

[providers.alpha]
base_url = "https://www.alphavantage.co/query"
api_key = "demo"
max_retries = 5
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.cache.sweep_interval_ms, 60_000);

        let alpha = config.provider("alpha").unwrap();
        assert_eq!(alpha.name, "alpha");
        assert_eq!(alpha.max_retries, 5);
        assert_eq!(alpha.timeout_ms, 30_000);
        assert!(config.provider("missing").is_none());
    }

    #[test]
    fn test_validate_reports_missing_keys() {
        let mut config = AppConfig::default();
        assert_eq!(config.validate(), vec!["No upstream providers configured"]);

        config
            .providers
            .insert("news".to_string(), ProviderConfig::new("news", ""));
        config.providers.insert(
            "alpha".to_string(),
            ProviderConfig::new("alpha", "https://example.com").with_api_key("k"),
        );

        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("'news' has an empty base_url"));
        assert!(warnings[1].contains("'news' API key"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let provider = ProviderConfig::new("alpha", "https://example.com").with_api_key("secret");
        let printed = format!("{:?}", provider);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("[REDACTED]"));
    }
}
