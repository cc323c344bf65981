//! 설정 관리.
//!
//! 이 모듈은 오버레이 클라이언트의 설정을 정의하고 관리합니다.
//! 서버 URL, 재연결 백오프, 자격 증명 모드 등 연결 파라미터는
//! 코어 계약이 아닌 외부 설정입니다.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::OverlayPosition;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 스트림 서버 연결 설정
    #[serde(default)]
    pub stream: StreamConfig,
    /// REST API 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// 오버레이 표시 설정
    #[serde(default)]
    pub overlay: OverlayConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 스트림 서버 연결 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// 스트림 서버 WebSocket URL
    pub url: String,
    /// 연결 타임아웃 (초)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 재연결 백오프 시작값 (밀리초)
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,
    /// 재연결 백오프 상한 (밀리초)
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    /// 하트비트 Ping 간격 (초)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// 송신 채널 용량
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_backoff_initial() -> u64 {
    1_000
}
fn default_backoff_max() -> u64 {
    30_000
}
fn default_ping_interval() -> u64 {
    30
}
fn default_channel_capacity() -> usize {
    256
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/stream".to_string(),
            connect_timeout_secs: default_connect_timeout(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_ms: default_backoff_max(),
            ping_interval_secs: default_ping_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// REST API 설정.
///
/// 폴 부트스트랩과 시간 동기화 요청은 짧은 타임아웃을 갖고
/// 실패 시 안전한 기본값으로 폴백합니다 (fail-open).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// REST API 기본 URL
    pub base_url: String,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    /// 시간 재동기화 간격 (초)
    #[serde(default = "default_time_sync_interval")]
    pub time_sync_interval_secs: u64,
}

fn default_api_timeout() -> u64 {
    5
}
fn default_time_sync_interval() -> u64 {
    300
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            timeout_secs: default_api_timeout(),
            time_sync_interval_secs: default_time_sync_interval(),
        }
    }
}

/// 오버레이 표시 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OverlayConfig {
    /// 알림 기본 표시 시간 (밀리초)
    #[serde(default = "default_notification_ttl")]
    pub notification_ttl_ms: u64,
    /// 알림 기본 표시 위치
    #[serde(default)]
    pub notification_position: OverlayPosition,
    /// 폴 마감 후 결과 유지 시간 (초)
    #[serde(default = "default_poll_hold")]
    pub poll_hold_secs: u64,
}

fn default_notification_ttl() -> u64 {
    8_000
}
fn default_poll_hold() -> u64 {
    30
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            notification_ttl_ms: default_notification_ttl(),
            notification_position: OverlayPosition::default(),
            poll_hold_secs: default_poll_hold(),
        }
    }
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

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 기본값으로 시작
            .set_default("stream.url", "ws://127.0.0.1:4000/stream")?
            .set_default("api.base_url", "http://127.0.0.1:4000")?
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("OVERLAY")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.stream.backoff_initial_ms, 1_000);
        assert_eq!(config.stream.backoff_max_ms, 30_000);
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.overlay.poll_hold_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config_uses_field_defaults() {
        let config: StreamConfig =
            serde_json::from_value(serde_json::json!({ "url": "wss://stream.example.com" }))
                .unwrap();
        assert_eq!(config.url, "wss://stream.example.com");
        assert_eq!(config.ping_interval_secs, 30);
        assert_eq!(config.channel_capacity, 256);
    }
}
