//! 캐시를 거친 업스트림 조회.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, Instrument};

use riser_cache::TtlClass;
use riser_core::AppConfig;
use riser_fetch::{ApiClient, CachedFetcher, RequestOptions, TracingInterceptor};

use super::open_cache;

/// fetch 명령 인자.
#[derive(Debug)]
pub struct FetchArgs {
    /// 제공자 이름
    pub provider: String,
    /// 엔드포인트 경로
    pub endpoint: String,
    /// 캐시 키 (없으면 자동 생성)
    pub key: Option<String>,
    /// TTL 분류
    pub ttl: TtlClass,
    /// 영구 저장 여부
    pub persist: bool,
    /// 쿼리 파라미터
    pub params: Vec<(String, String)>,
}

/// `NAME=VALUE` 형식의 파라미터를 파싱합니다.
pub fn parse_param(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid parameter '{}': expected NAME=VALUE", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid parameter '{}': empty name", raw);
    }
    Ok((name.to_string(), value.to_string()))
}

/// 기본 캐시 키: `<provider>:<endpoint>[?name=value&...]`.
pub fn default_key(provider: &str, endpoint: &str, params: &[(String, String)]) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    if params.is_empty() {
        return format!("{}:{}", provider, endpoint);
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}:{}?{}", provider, endpoint, query)
}

/// 조회 결과를 JSON으로 출력합니다.
pub async fn run(config: &AppConfig, args: FetchArgs) -> Result<Value> {
    let mut known: Vec<&String> = config.providers.keys().collect();
    known.sort();
    let provider = config.provider(&args.provider).with_context(|| {
        format!(
            "Unknown provider '{}'. Configured: {:?}",
            args.provider, known
        )
    })?;

    let client = ApiClient::builder(provider)
        .interceptor(TracingInterceptor)
        .build()
        .context("Failed to create API client")?;
    let cache = Arc::new(open_cache(&config.cache)?);
    let fetcher = CachedFetcher::new(Arc::clone(&cache), client);

    let key = args
        .key
        .clone()
        .unwrap_or_else(|| default_key(&args.provider, &args.endpoint, &args.params));
    let options = args
        .params
        .iter()
        .fold(RequestOptions::new(), |options, (name, value)| {
            options.param(name.as_str(), value)
        });

    let span = riser_core::fetch_span!("cli_fetch", args.provider, key);
    let value: Value = fetcher
        .get_or_fetch(&key, args.ttl, args.persist, &args.endpoint, options)
        .instrument(span)
        .await
        .with_context(|| format!("Fetch failed for '{}'", key))?;

    println!("{}", serde_json::to_string_pretty(&value)?);

    if let Some(snapshot) = fetcher.client().rate_limit() {
        info!(
            provider = %args.provider,
            remaining = snapshot.remaining,
            limit = snapshot.limit,
            reset_at = %snapshot.reset_at,
            "Rate limit status"
        );
        eprintln!(
            "rate limit: {}/{} remaining (resets {})",
            snapshot.remaining, snapshot.limit, snapshot.reset_at
        );
    }

    cache.destroy();
    Ok(value)
}
