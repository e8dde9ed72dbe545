//! 영구 저장소 오류 타입.

use thiserror::Error;

/// 영구 키/값 저장소 오류.
///
/// 캐시 계층 내부에서만 처리되며 호출자에게 전파되지 않습니다.
#[derive(Debug, Error)]
pub enum StoreError {
    /// 저장 용량 초과
    #[error("Storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    /// 파일 입출력 오류
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// 용량 초과 오류인지 확인.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
