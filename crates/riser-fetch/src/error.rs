//! 요청 에러 타입과 분류기.
//!
//! 전송 실패, 타임아웃, HTTP 상태 코드를 재시도 가능 여부가 표시된
//! [`FetchError`]로 변환합니다.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// 429 응답에 `retry-after`가 없을 때의 기본값.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// 분류된 요청 에러.
///
/// 중복 제거된 호출자들이 같은 에러를 공유하므로 `Clone`입니다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// 연결 실패 등 전송 계층 에러
    #[error("Network error: {0}")]
    NetworkFailure(String),

    /// 시도당 타임아웃 초과
    #[error("Request timeout: {0}")]
    TimedOut(String),

    /// 요청 한도 초과 (429)
    #[error("Rate limit exceeded (retry after {}s)", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// 5xx 또는 408
    #[error("{message}")]
    ServerError { status: u16, message: String },

    /// 429를 제외한 4xx 등 재시도해도 소용없는 응답
    #[error("{message}")]
    ClientError { status: u16, message: String },

    /// 2xx 응답 본문 파싱 실패
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// 요청 자체를 만들 수 없음 (잘못된 URL, 헤더, 본문)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// 에러 코드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NetworkError,
    Timeout,
    RateLimitExceeded,
    ServerError,
    ClientError,
    MalformedResponse,
    InvalidRequest,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::NetworkError => write!(f, "NETWORK_ERROR"),
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::RateLimitExceeded => write!(f, "RATE_LIMIT_EXCEEDED"),
            ErrorCode::ServerError => write!(f, "SERVER_ERROR"),
            ErrorCode::ClientError => write!(f, "CLIENT_ERROR"),
            ErrorCode::MalformedResponse => write!(f, "MALFORMED_RESPONSE"),
            ErrorCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
        }
    }
}

impl FetchError {
    /// 에러 코드.
    pub fn code(&self) -> ErrorCode {
        match self {
            FetchError::NetworkFailure(_) => ErrorCode::NetworkError,
            FetchError::TimedOut(_) => ErrorCode::Timeout,
            FetchError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            FetchError::ServerError { .. } => ErrorCode::ServerError,
            FetchError::ClientError { .. } => ErrorCode::ClientError,
            FetchError::MalformedResponse(_) => ErrorCode::MalformedResponse,
            FetchError::InvalidRequest(_) => ErrorCode::InvalidRequest,
        }
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::NetworkFailure(_)
                | FetchError::TimedOut(_)
                | FetchError::RateLimited { .. }
                | FetchError::ServerError { .. }
        )
    }

    /// 응답에서 비롯된 에러라면 HTTP 상태 코드.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FetchError::RateLimited { .. } => Some(429),
            FetchError::ServerError { status, .. } | FetchError::ClientError { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// 서버가 알려준 재시도 대기 시간 (429 전용).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// 2xx가 아닌 응답을 분류합니다.
    ///
    /// - 429: `RateLimited` (`retry-after` 초, 기본 60초)
    /// - 5xx, 408: `ServerError`
    /// - 그 외: `ClientError`
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs);
            return FetchError::RateLimited { retry_after };
        }

        let message = error_message(status, body);
        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            FetchError::ServerError {
                status: status.as_u16(),
                message,
            }
        } else {
            FetchError::ClientError {
                status: status.as_u16(),
                message,
            }
        }
    }
}

/// 에러 응답 메시지.
///
/// JSON 본문의 `message`, `error` 필드를 우선하고 없으면 `HTTP <status>: <reason>`.
pub fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["message", "error"].iter().find_map(|field| {
                json.get(*field)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        })
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::TimedOut(err.to_string())
        } else if err.is_builder() {
            FetchError::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            FetchError::MalformedResponse(err.to_string())
        } else {
            FetchError::NetworkFailure(err.to_string())
        }
    }
}

/// riser-fetch 결과 타입.
pub type FetchResult<T> = Result<T, FetchError>;
