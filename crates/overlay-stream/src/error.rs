//! 스트림 연결 에러 타입.

use thiserror::Error;

/// 스트림 연결 관련 에러.
#[derive(Debug, Error)]
pub enum StreamError {
    /// 연결 수립 실패
    #[error("Connect failed: {0}")]
    Connect(String),

    /// WebSocket 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 연결되지 않음
    #[error("Not connected")]
    NotConnected,

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 내부 채널 종료
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// 스트림 작업을 위한 Result 타입.
pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Connect(_)
                | StreamError::WebSocket(_)
                | StreamError::Timeout(_)
                | StreamError::NotConnected
        )
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::WebSocket(err.to_string())
    }
}

impl From<StreamError> for overlay_core::OverlayError {
    fn from(err: StreamError) -> Self {
        overlay_core::OverlayError::Stream(err.to_string())
    }
}
