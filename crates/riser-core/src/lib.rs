//! # Riser Core
//!
//! Early Riser 데이터 접근 계층의 공통 기반을 제공합니다.
//!
//! - 설정 관리 (파일 + 환경 변수)
//! - 로깅 인프라

pub mod config;
pub mod logging;

pub use config::*;
pub use logging::*;
