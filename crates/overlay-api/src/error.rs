//! REST API 에러 타입.

use thiserror::Error;

/// REST API 관련 에러.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// HTTP 에러 응답
    #[error("API error {code}: {message}")]
    Status { code: u16, message: String },
}

/// API 작업을 위한 Result 타입.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Status { code, .. } => *code >= 500,
            ApiError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

impl From<ApiError> for overlay_core::OverlayError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(msg) | ApiError::Timeout(msg) => {
                overlay_core::OverlayError::Network(msg)
            }
            ApiError::Parse(msg) => overlay_core::OverlayError::Serialization(msg),
            status @ ApiError::Status { .. } => {
                overlay_core::OverlayError::Api(status.to_string())
            }
        }
    }
}
