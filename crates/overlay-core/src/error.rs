//! 오버레이 시스템의 에러 타입.
//!
//! 이 모듈은 오버레이 클라이언트 전반에서 사용되는 에러 타입을 정의합니다.
//! 이 코어의 어떤 에러도 프로세스를 중단시키지 않습니다 - 최악의 경우에도
//! "재연결까지 실시간 업데이트 없음"으로 강등될 뿐입니다.

use thiserror::Error;

/// 핵심 오버레이 에러.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 스트림 서버 연결 에러
    #[error("스트림 에러: {0}")]
    Stream(String),

    /// REST API 에러
    #[error("API 에러: {0}")]
    Api(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 시간 동기화 에러
    #[error("시간 동기화 에러: {0}")]
    TimeSync(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 오버레이 작업을 위한 Result 타입.
pub type OverlayResult<T> = Result<T, OverlayError>;

impl OverlayError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OverlayError::Network(_) | OverlayError::Stream(_) | OverlayError::TimeSync(_)
        )
    }

    /// 안전한 기본값으로 강등해도 되는 에러인지 확인합니다.
    ///
    /// 부트스트랩/시간 동기화 실패는 오버레이 렌더링을 막지 않고
    /// "활성 폴 없음" / "오프셋 0"으로 폴백합니다.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            OverlayError::Api(_) | OverlayError::TimeSync(_) | OverlayError::Network(_)
        )
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        OverlayError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for OverlayError {
    fn from(err: config::ConfigError) -> Self {
        OverlayError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let network_err = OverlayError::Network("timeout".to_string());
        assert!(network_err.is_retryable());

        let input_err = OverlayError::InvalidInput("empty brand".to_string());
        assert!(!input_err.is_retryable());
    }

    #[test]
    fn test_error_degradable() {
        let sync_err = OverlayError::TimeSync("no Date header".to_string());
        assert!(sync_err.is_degradable());

        let config_err = OverlayError::Config("missing url".to_string());
        assert!(!config_err.is_degradable());
    }
}
