//! 요청/응답 관찰 훅.
//!
//! 인터셉터는 관찰 전용입니다. 요청이나 결과를 바꿀 수 없습니다.

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::error::FetchError;

/// 요청 생명주기 훅. 모든 메서드는 기본적으로 아무것도 하지 않습니다.
pub trait RequestInterceptor: Send + Sync {
    /// 요청 시작 전 (재시도와 무관하게 한 번).
    fn on_request(&self, _method: &Method, _url: &str, _headers: &HeaderMap) {}

    /// 응답 수신 시 (시도마다).
    fn on_response(&self, _url: &str, _status: StatusCode, _headers: &HeaderMap) {}

    /// 최종 실패 시.
    fn on_error(&self, _url: &str, _error: &FetchError) {}
}

/// 훅을 tracing 이벤트로 남기는 인터셉터.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterceptor;

impl RequestInterceptor for TracingInterceptor {
    fn on_request(&self, method: &Method, url: &str, _headers: &HeaderMap) {
        debug!(method = %method, url = url, "HTTP request");
    }

    fn on_response(&self, url: &str, status: StatusCode, _headers: &HeaderMap) {
        debug!(url = url, status = status.as_u16(), "HTTP response");
    }

    fn on_error(&self, url: &str, error: &FetchError) {
        warn!(
            url = url,
            code = %error.code(),
            status = error.http_status(),
            error = %error,
            "HTTP request failed"
        );
    }
}
