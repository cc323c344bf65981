//! 스트림 서버 와이어 이벤트 타입.
//!
//! 모든 이벤트는 `{"event": <이름>, "data": {...}}` 형태의 JSON 텍스트
//! 프레임으로 교환됩니다. 이벤트 이름은 문자열 디스패치 대신 닫힌
//! `EventKind` 열거형으로 매핑되어 컴파일 타임 완전성 검사를 받습니다.
//! 알 수 없는 이벤트 이름은 역직렬화 단계에서 걸러져 폐기됩니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use overlay_core::{BrandId, OverlayPosition, PollResults};

// ============================================================================
// 이벤트 종류
// ============================================================================

/// 수신 이벤트의 닫힌 집합.
///
/// 구독 테이블의 인덱스로 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// 시청자 입장
    StreamJoined = 0,
    /// 팁 수신
    TipReceived,
    /// 투표 수신
    VoteReceived,
    /// 토큰 거래 체결
    TokenTraded,
    /// 센티먼트 폴 시작
    StartSentimentPoll,
    /// 센티먼트 폴 업데이트
    UpdateSentimentPoll,
    /// 센티먼트 폴 종료
    EndSentimentPoll,
    /// 서버 에러 통지
    Error,
}

impl EventKind {
    /// 이벤트 종류 개수.
    pub const COUNT: usize = 8;

    /// 구독 테이블 인덱스.
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// 와이어 이벤트 이름.
    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::StreamJoined => "stream_joined",
            EventKind::TipReceived => "tip_received",
            EventKind::VoteReceived => "vote_received",
            EventKind::TokenTraded => "token_traded",
            EventKind::StartSentimentPoll => "start_sentiment_poll",
            EventKind::UpdateSentimentPoll => "update_sentiment_poll",
            EventKind::EndSentimentPoll => "end_sentiment_poll",
            EventKind::Error => "error",
        }
    }

    /// 모든 이벤트 종류 반환.
    pub fn all() -> [EventKind; Self::COUNT] {
        [
            EventKind::StreamJoined,
            EventKind::TipReceived,
            EventKind::VoteReceived,
            EventKind::TokenTraded,
            EventKind::StartSentimentPoll,
            EventKind::UpdateSentimentPoll,
            EventKind::EndSentimentPoll,
            EventKind::Error,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

// ============================================================================
// 이벤트 페이로드
// ============================================================================

/// 스트림 룸 합류 페이로드 (수신/송신 공용).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamJoinedPayload {
    /// 브랜드 ID
    pub brand_id: BrandId,
    /// 사용자명
    pub username: String,
    /// 프로필 이미지 URL
    #[serde(default)]
    pub profile_picture: Option<String>,
}

/// 팁 이벤트 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipPayload {
    /// 브랜드 ID
    pub brand_id: BrandId,
    /// 사용자명
    pub username: String,
    /// 프로필 이미지 URL
    #[serde(default)]
    pub profile_picture: Option<String>,
    /// 팁 금액
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// 팁 토큰 심볼
    #[serde(default)]
    pub token: Option<String>,
    /// 첨부 메시지
    #[serde(default)]
    pub message: Option<String>,
}

/// 투표 이벤트 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    /// 브랜드 ID
    pub brand_id: BrandId,
    /// 사용자명
    pub username: String,
    /// 프로필 이미지 URL
    #[serde(default)]
    pub profile_picture: Option<String>,
    /// 투표 방향 ("bull" | "bear")
    #[serde(default)]
    pub vote: Option<String>,
}

/// 토큰 거래 이벤트 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePayload {
    /// 브랜드 ID
    pub brand_id: BrandId,
    /// 사용자명
    pub username: String,
    /// 프로필 이미지 URL
    #[serde(default)]
    pub profile_picture: Option<String>,
    /// 거래 방향 ("buy" | "sell")
    #[serde(default)]
    pub side: Option<String>,
    /// 거래 수량
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// 토큰 심볼
    #[serde(default)]
    pub token: Option<String>,
}

/// 폴 시작 이벤트 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStartPayload {
    /// 폴 ID
    pub id: String,
    /// 브랜드 ID
    pub brand_id: BrandId,
    /// 폴 질문
    pub poll_question: String,
    /// 절대 마감 시각 (epoch 밀리초)
    pub end_time_ms: i64,
    /// 초기 투표 수
    #[serde(default)]
    pub votes: u64,
    /// 초기 참여자 수
    #[serde(default)]
    pub voters: u64,
    /// 투표 참여용 QR 코드 URL
    #[serde(default)]
    pub qr_code_url: Option<String>,
    /// 표시 위치
    #[serde(default)]
    pub position: Option<OverlayPosition>,
    /// 초기 집계 결과
    #[serde(default)]
    pub results: PollResults,
}

/// 폴 업데이트 이벤트 페이로드.
///
/// `end_time_ms`가 실리면 서버 측 시간 연장으로 마감을 교체합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollUpdatePayload {
    /// 폴 ID
    pub id: String,
    /// 브랜드 ID
    pub brand_id: BrandId,
    /// 표시 위치
    #[serde(default)]
    pub position: Option<OverlayPosition>,
    /// 참여자 수
    #[serde(default)]
    pub voters: u64,
    /// 투표 수
    #[serde(default)]
    pub votes: u64,
    /// 새 마감 시각 (epoch 밀리초, 시간 연장 시에만 존재)
    #[serde(default)]
    pub end_time_ms: Option<i64>,
    /// 집계 결과
    #[serde(default)]
    pub results: PollResults,
}

/// 폴 종료 이벤트 페이로드 (최종 집계 포함).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollEndPayload {
    /// 폴 ID
    pub id: String,
    /// 브랜드 ID
    pub brand_id: BrandId,
    /// 최종 투표 수
    #[serde(default)]
    pub votes: u64,
    /// 최종 참여자 수
    #[serde(default)]
    pub voters: u64,
    /// 최종 집계 결과
    #[serde(default)]
    pub results: PollResults,
}

/// 서버 에러 통지 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// 브랜드 ID (전역 에러면 없음)
    #[serde(default)]
    pub brand_id: Option<BrandId>,
    /// 에러 메시지
    pub message: String,
}

// ============================================================================
// 수신/송신 이벤트
// ============================================================================

/// 서버 → 클라이언트 이벤트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 시청자 입장
    StreamJoined(StreamJoinedPayload),
    /// 팁 수신
    TipReceived(TipPayload),
    /// 투표 수신
    VoteReceived(VotePayload),
    /// 토큰 거래 체결
    TokenTraded(TradePayload),
    /// 센티먼트 폴 시작
    StartSentimentPoll(PollStartPayload),
    /// 센티먼트 폴 업데이트
    UpdateSentimentPoll(PollUpdatePayload),
    /// 센티먼트 폴 종료
    EndSentimentPoll(PollEndPayload),
    /// 서버 에러 통지
    Error(ErrorPayload),
}

impl ServerEvent {
    /// 이벤트 종류 반환.
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::StreamJoined(_) => EventKind::StreamJoined,
            ServerEvent::TipReceived(_) => EventKind::TipReceived,
            ServerEvent::VoteReceived(_) => EventKind::VoteReceived,
            ServerEvent::TokenTraded(_) => EventKind::TokenTraded,
            ServerEvent::StartSentimentPoll(_) => EventKind::StartSentimentPoll,
            ServerEvent::UpdateSentimentPoll(_) => EventKind::UpdateSentimentPoll,
            ServerEvent::EndSentimentPoll(_) => EventKind::EndSentimentPoll,
            ServerEvent::Error(_) => EventKind::Error,
        }
    }

    /// 테넌트 필터링용 브랜드 ID 반환.
    pub fn brand_id(&self) -> Option<&BrandId> {
        match self {
            ServerEvent::StreamJoined(p) => Some(&p.brand_id),
            ServerEvent::TipReceived(p) => Some(&p.brand_id),
            ServerEvent::VoteReceived(p) => Some(&p.brand_id),
            ServerEvent::TokenTraded(p) => Some(&p.brand_id),
            ServerEvent::StartSentimentPoll(p) => Some(&p.brand_id),
            ServerEvent::UpdateSentimentPoll(p) => Some(&p.brand_id),
            ServerEvent::EndSentimentPoll(p) => Some(&p.brand_id),
            ServerEvent::Error(p) => p.brand_id.as_ref(),
        }
    }
}

/// 클라이언트 → 서버 이벤트.
///
/// 폴 제어 변형은 시청자 오버레이가 아닌 모더레이터/관리 화면에서
/// 사용됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// 스트림 룸 합류
    StreamJoined(StreamJoinedPayload),
    /// 팁 전송 통지
    TipSent(TipPayload),
    /// 토큰 거래 통지
    TokenTraded(TradePayload),
    /// 투표 제출
    VoteCasted(VotePayload),
    /// 센티먼트 폴 시작 (모더레이터)
    StartSentimentPoll(PollStartPayload),
    /// 센티먼트 폴 업데이트 (모더레이터)
    UpdateSentimentPoll(PollUpdatePayload),
    /// 센티먼트 폴 종료 (모더레이터)
    EndSentimentPoll(PollEndPayload),
}

impl ClientEvent {
    /// 와이어 이벤트 이름.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ClientEvent::StreamJoined(_) => "stream_joined",
            ClientEvent::TipSent(_) => "tip_sent",
            ClientEvent::TokenTraded(_) => "token_traded",
            ClientEvent::VoteCasted(_) => "vote_casted",
            ClientEvent::StartSentimentPoll(_) => "start_sentiment_poll",
            ClientEvent::UpdateSentimentPoll(_) => "update_sentiment_poll",
            ClientEvent::EndSentimentPoll(_) => "end_sentiment_poll",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_server_event_wire_format() {
        let json = r#"{
            "event": "tip_received",
            "data": {
                "brandId": "brand-1",
                "username": "alice",
                "profilePicture": "https://cdn.example.com/a.png",
                "amount": "2.5",
                "token": "SOL",
                "message": "gm"
            }
        }"#;

        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind(), EventKind::TipReceived);
        assert_eq!(event.brand_id().unwrap().as_str(), "brand-1");

        match event {
            ServerEvent::TipReceived(tip) => {
                assert_eq!(tip.amount, Some(dec!(2.5)));
                assert_eq!(tip.token.as_deref(), Some("SOL"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_poll_start_wire_format() {
        let json = r#"{
            "event": "start_sentiment_poll",
            "data": {
                "id": "p-1",
                "brandId": "brand-1",
                "pollQuestion": "Will SOL pump?",
                "endTimeMs": 1700000060000,
                "votes": 0,
                "voters": 0,
                "qrCodeUrl": "https://vote.example.com/p-1",
                "position": "top-right",
                "results": { "bullPercent": "50", "bearPercent": "50" }
            }
        }"#;

        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::StartSentimentPoll(poll) => {
                assert_eq!(poll.end_time_ms, 1_700_000_060_000);
                assert_eq!(poll.position, Some(OverlayPosition::TopRight));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_name_fails_parse() {
        let json = r#"{"event": "totally_new_event", "data": {}}"#;
        assert!(serde_json::from_str::<ServerEvent>(json).is_err());
    }

    #[test]
    fn test_client_event_roundtrip() {
        let event = ClientEvent::VoteCasted(VotePayload {
            brand_id: BrandId::new("brand-1"),
            username: "bob".to_string(),
            profile_picture: None,
            vote: Some("bull".to_string()),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"vote_casted\""));
        assert_eq!(event.wire_name(), "vote_casted");

        let parsed: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_kind_wire_names_match_event_tags() {
        for kind in EventKind::all() {
            assert_eq!(kind.to_string(), kind.wire_name());
        }
        assert_eq!(EventKind::all().len(), EventKind::COUNT);
    }
}
