//! 오버레이 알림(팝업) 레코드.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::OverlayPosition;

/// 알림 기본 표시 시간 (밀리초).
pub const DEFAULT_NOTIFICATION_TTL_MS: u64 = 8_000;

/// 화면에 잠시 표시되는 트랜지언트 알림 레코드.
///
/// 팁/투표/거래/입장 이벤트가 도착하면 생성되고, 표시 시간이 지나거나
/// 명시적으로 해제되면 소멸합니다. 알림 큐가 이 레코드를 독점 소유하며
/// 소비자는 watch 채널을 통해 읽기만 합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayNotification {
    /// 고유 알림 ID (enqueue마다 새로 발급)
    pub id: String,
    /// 행위자 사용자명
    pub username: String,
    /// 행위자 프로필 이미지 URL
    pub avatar_url: Option<String>,
    /// 표시 문구 (예: "tipped 2.5 SOL")
    pub text: Option<String>,
    /// 사용자 정의 메시지 (팁에 첨부된 메시지 등)
    pub custom_message: Option<String>,
    /// 표시 위치
    pub position: OverlayPosition,
    /// 표시 시간 (밀리초, 0이면 수동 해제 전까지 유지)
    pub ttl_ms: u64,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl OverlayNotification {
    /// 새 알림을 생성합니다.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            avatar_url: None,
            text: None,
            custom_message: None,
            position: OverlayPosition::default(),
            ttl_ms: DEFAULT_NOTIFICATION_TTL_MS,
            created_at: Utc::now(),
        }
    }

    /// 프로필 이미지 URL을 설정합니다.
    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// 표시 문구를 설정합니다.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// 사용자 정의 메시지를 설정합니다.
    pub fn with_custom_message(mut self, message: impl Into<String>) -> Self {
        self.custom_message = Some(message.into());
        self
    }

    /// 표시 위치를 설정합니다.
    pub fn with_position(mut self, position: OverlayPosition) -> Self {
        self.position = position;
        self
    }

    /// 표시 시간을 설정합니다.
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_builder() {
        let notification = OverlayNotification::new("alice")
            .with_avatar_url("https://cdn.example.com/alice.png")
            .with_text("tipped 2.5 SOL")
            .with_custom_message("gm!")
            .with_position(OverlayPosition::TopRight)
            .with_ttl_ms(5_000);

        assert_eq!(notification.username, "alice");
        assert_eq!(notification.text.as_deref(), Some("tipped 2.5 SOL"));
        assert_eq!(notification.custom_message.as_deref(), Some("gm!"));
        assert_eq!(notification.position, OverlayPosition::TopRight);
        assert_eq!(notification.ttl_ms, 5_000);
    }

    #[test]
    fn test_notification_ids_are_unique_per_record() {
        let a = OverlayNotification::new("bob");
        let b = OverlayNotification::new("bob");
        assert_ne!(a.id, b.id);
    }
}
