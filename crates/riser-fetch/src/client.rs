//! 업스트림 REST 클라이언트.
//!
//! 하나의 논리적 호출을 다음 단계로 감쌉니다:
//!
//! ```text
//! URL/헤더 구성 ──> 중복 제거 ──> 재시도 루프 ──> 시도(타임아웃) ──> 상태 분류
//!                                                    │
//!                                                    └─> rate limit 헤더 기록
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use riser_core::ProviderConfig;

use crate::dedup::{request_key, RequestDeduplicator};
use crate::error::{FetchError, FetchResult};
use crate::interceptor::RequestInterceptor;
use crate::rate_limit::{RateLimitSnapshot, RateLimitTracker};
use crate::retry::{with_retry_if, RetryConfig};

/// 호출자 재시도 조건.
pub type RetryPredicate = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;

/// 요청별 옵션.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// 쿼리 파라미터 (순서 유지)
    pub params: Vec<(String, String)>,
    /// 추가 헤더 (기본 헤더보다 우선)
    pub headers: Vec<(String, String)>,
    /// 시도당 타임아웃 (없으면 클라이언트 기본값)
    pub timeout: Option<Duration>,
    /// 재시도 조건 (재시도 가능한 에러에 한해 추가로 적용)
    pub should_retry: Option<RetryPredicate>,
}

impl RequestOptions {
    /// 빈 옵션.
    pub fn new() -> Self {
        Self::default()
    }

    /// 쿼리 파라미터를 추가합니다.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// 헤더를 추가합니다.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 시도당 타임아웃을 지정합니다.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 재시도 조건을 지정합니다.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&FetchError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("params", &self.params)
            .field(
                "headers",
                &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .field("should_retry", &self.should_retry.is_some())
            .finish()
    }
}

/// [`ApiClient`] 빌더.
pub struct ApiClientBuilder {
    config: ProviderConfig,
    rate_limits: Option<Arc<RateLimitTracker>>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl ApiClientBuilder {
    /// 여러 클라이언트가 하나의 rate limit 추적기를 공유하도록 지정합니다.
    pub fn rate_limits(mut self, tracker: Arc<RateLimitTracker>) -> Self {
        self.rate_limits = Some(tracker);
        self
    }

    /// 인터셉터를 추가합니다.
    pub fn interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// 클라이언트를 생성합니다.
    ///
    /// # Errors
    /// 기본 URL이나 헤더가 잘못되었으면 `InvalidRequest`, HTTP 클라이언트
    /// 생성에 실패하면 `NetworkFailure`.
    pub fn build(self) -> FetchResult<ApiClient> {
        let config = self.config;

        let base_url = config
            .base_url
            .strip_suffix('/')
            .unwrap_or(&config.base_url)
            .to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| FetchError::InvalidRequest(format!("Invalid base URL '{}': {}", base_url, e)))?;

        let upstream = if config.name.is_empty() {
            parsed.host_str().unwrap_or(&base_url).to_string()
        } else {
            config.name.clone()
        };

        let http = reqwest::Client::builder().build().map_err(|e| {
            FetchError::NetworkFailure(format!("Failed to build HTTP client: {}", e))
        })?;

        let inner = ClientInner {
            http,
            default_headers: default_headers(&config.headers)?,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()).map(SecretString::from),
            timeout: Duration::from_millis(config.timeout_ms),
            retry: RetryConfig::from(&config),
            rate_limits: self.rate_limits.unwrap_or_default(),
            interceptors: self.interceptors,
            base_url,
            upstream,
        };

        debug!(
            upstream = %inner.upstream,
            base_url = %inner.base_url,
            max_retries = inner.retry.max_retries,
            "API client created"
        );

        Ok(ApiClient {
            inner: Arc::new(inner),
            dedup: RequestDeduplicator::new(),
        })
    }
}

fn parse_header(name: &str, value: &str) -> FetchResult<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| FetchError::InvalidRequest(format!("Invalid header name '{}': {}", name, e)))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| FetchError::InvalidRequest(format!("Invalid value for header '{}': {}", name, e)))?;
    Ok((header_name, header_value))
}

/// `Content-Type: application/json` 위에 설정 헤더를 덮어씁니다.
fn default_headers(configured: &HashMap<String, String>) -> FetchResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in configured {
        let (name, value) = parse_header(name, value)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    upstream: String,
    api_key: Option<SecretString>,
    default_headers: HeaderMap,
    timeout: Duration,
    retry: RetryConfig,
    rate_limits: Arc<RateLimitTracker>,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl ClientInner {
    /// 재시도를 포함한 하나의 논리적 호출. 성공 시 응답 본문.
    #[instrument(
        name = "fetch",
        skip_all,
        fields(upstream = %self.upstream, method = %method, url = %url)
    )]
    async fn execute(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<Vec<u8>>,
        timeout: Duration,
        should_retry: Option<RetryPredicate>,
    ) -> FetchResult<String> {
        for interceptor in &self.interceptors {
            interceptor.on_request(&method, url.as_str(), &headers);
        }

        let (method_ref, url_ref, headers_ref, body_ref) = (&method, &url, &headers, body.as_deref());
        let result = with_retry_if(
            &self.retry,
            |e| should_retry.as_ref().map_or(true, |predicate| predicate(e)),
            || self.attempt(method_ref, url_ref, headers_ref, body_ref, timeout),
        )
        .await;

        if let Err(e) = &result {
            for interceptor in &self.interceptors {
                interceptor.on_error(url.as_str(), e);
            }
        }
        result
    }

    /// 한 번의 시도. 타임아웃이 지나면 전송 future를 버리고 `TimedOut`.
    async fn attempt(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&[u8]>,
        timeout: Duration,
    ) -> FetchResult<String> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            // 본문 수신 중 끊긴 연결은 파싱 실패가 아니라 전송 실패
            let body = response.text().await.map_err(|e| read_body_error(status, &headers, e));
            Ok::<_, FetchError>((status, headers, body))
        };

        let (status, response_headers, body) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| {
                FetchError::TimedOut(format!("No response within {}ms", timeout.as_millis()))
            })??;

        if let Some(snapshot) = RateLimitSnapshot::from_headers(&response_headers, Utc::now()) {
            self.rate_limits.observe(&self.upstream, snapshot);
        }

        for interceptor in &self.interceptors {
            interceptor.on_response(url.as_str(), status, &response_headers);
        }

        let text = body?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(FetchError::from_response(status, &response_headers, &text))
        }
    }
}

/// 본문 읽기 실패 분류. 오류 상태 코드는 그대로 유지합니다.
fn read_body_error(status: StatusCode, headers: &HeaderMap, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::TimedOut(err.to_string());
    }
    if status.is_success() {
        FetchError::NetworkFailure(format!("Connection lost while reading response body: {}", err))
    } else {
        FetchError::from_response(status, headers, "")
    }
}

/// 업스트림 REST 클라이언트.
///
/// 복제본은 설정, rate limit 추적기, 진행 중 요청 테이블을 공유합니다.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
    dedup: RequestDeduplicator<String>,
}

impl ApiClient {
    /// 빌더를 생성합니다.
    pub fn builder(config: ProviderConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            rate_limits: None,
            interceptors: Vec::new(),
        }
    }

    /// 기본 설정으로 클라이언트를 생성합니다.
    pub fn new(config: ProviderConfig) -> FetchResult<Self> {
        Self::builder(config).build()
    }

    /// 논리적 업스트림 이름 (rate limit 추적 키).
    pub fn upstream(&self) -> &str {
        &self.inner.upstream
    }

    /// 끝의 `/`가 제거된 기본 URL.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// 이 업스트림의 최신 rate limit 스냅샷.
    pub fn rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.inner.rate_limits.get(&self.inner.upstream)
    }

    /// 공유 rate limit 추적기.
    pub fn rate_limits(&self) -> &Arc<RateLimitTracker> {
        &self.inner.rate_limits
    }

    /// 진행 중인 요청 수.
    pub fn pending_requests(&self) -> usize {
        self.dedup.pending_count()
    }

    /// 요청 URL을 만듭니다.
    ///
    /// 기본 URL 끝의 `/`와 endpoint 앞의 `/`를 하나씩 제거한 뒤 `/`로 잇고
    /// 쿼리 파라미터를 인코딩해 붙입니다.
    pub fn build_url(&self, endpoint: &str, params: &[(String, String)]) -> FetchResult<Url> {
        let path = endpoint.strip_prefix('/').unwrap_or(endpoint);
        let raw = format!("{}/{}", self.inner.base_url, path);

        let mut url = Url::parse(&raw)
            .map_err(|e| FetchError::InvalidRequest(format!("Invalid URL '{}': {}", raw, e)))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// 요청 헤더를 만듭니다.
    ///
    /// 우선순위: 요청별 헤더 > `Authorization: Bearer` > 설정 헤더 > `Content-Type`.
    pub fn build_headers(&self, extra: &[(String, String)]) -> FetchResult<HeaderMap> {
        let mut headers = self.inner.default_headers.clone();

        if let Some(key) = &self.inner.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
                .map_err(|e| FetchError::InvalidRequest(format!("Invalid API key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        for (name, value) in extra {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// GET 요청.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> FetchResult<T> {
        self.request(Method::GET, endpoint, None, options).await
    }

    /// JSON 본문 POST 요청.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> FetchResult<T> {
        let body = encode_body(body)?;
        self.request(Method::POST, endpoint, Some(body), options).await
    }

    /// JSON 본문 PUT 요청.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> FetchResult<T> {
        let body = encode_body(body)?;
        self.request(Method::PUT, endpoint, Some(body), options).await
    }

    /// DELETE 요청.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> FetchResult<T> {
        self.request(Method::DELETE, endpoint, None, options).await
    }

    /// 공통 요청 경로.
    ///
    /// 같은 메서드, URL, 본문의 요청이 진행 중이면 그 결과를 공유합니다.
    /// 이때 먼저 시작한 요청의 타임아웃과 재시도 조건이 적용됩니다.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
        options: RequestOptions,
    ) -> FetchResult<T> {
        let url = self.build_url(endpoint, &options.params)?;
        let headers = self.build_headers(&options.headers)?;
        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        let key = request_key(&method, url.as_str(), body.as_deref());

        let inner = Arc::clone(&self.inner);
        let should_retry = options.should_retry;
        let text = self
            .dedup
            .execute(key, move || async move {
                inner
                    .execute(method, url, headers, body, timeout, should_retry)
                    .await
            })
            .await?;

        parse_body(&text)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("upstream", &self.inner.upstream)
            .field("base_url", &self.inner.base_url)
            .field("api_key", &self.inner.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.inner.timeout)
            .field("retry", &self.inner.retry)
            .field("interceptors", &self.inner.interceptors.len())
            .finish()
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> FetchResult<Vec<u8>> {
    serde_json::to_vec(body)
        .map_err(|e| FetchError::InvalidRequest(format!("Failed to encode request body: {}", e)))
}

/// 2xx 본문을 역직렬화합니다. 빈 본문은 JSON `null`로 취급합니다.
fn parse_body<T: DeserializeOwned>(text: &str) -> FetchResult<T> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text)
        .map_err(|e| FetchError::MalformedResponse(format!("Failed to parse response: {}", e)))
}
