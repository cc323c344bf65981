//! 센티먼트 폴(불미터) 도메인 타입.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{BrandId, OverlayPosition};

/// 폴 집계 결과 (백분율).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    /// 상승(bull) 측 비율 (%)
    pub bull_percent: Decimal,
    /// 하락(bear) 측 비율 (%)
    pub bear_percent: Decimal,
}

impl Default for PollResults {
    fn default() -> Self {
        Self {
            bull_percent: Decimal::new(50, 0),
            bear_percent: Decimal::new(50, 0),
        }
    }
}

impl PollResults {
    /// 찬성/반대 투표 수에서 백분율을 계산합니다.
    ///
    /// 총 투표가 0이면 50/50을 반환합니다.
    pub fn from_counts(yes: u64, no: u64) -> Self {
        let total = yes + no;
        if total == 0 {
            return Self::default();
        }

        let bull = (Decimal::from(yes) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(1);
        Self {
            bull_percent: bull,
            bear_percent: Decimal::ONE_HUNDRED - bull,
        }
    }
}

/// 브랜드별 정규화된 폴 뷰.
///
/// REST 부트스트랩과 실시간 이벤트가 모두 이 하나의 형태로 수렴합니다.
/// 브랜드당 최대 하나만 "현재" 폴로 존재합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoll {
    /// 폴 ID
    pub id: String,
    /// 소속 브랜드
    pub brand_id: BrandId,
    /// 폴 질문 문구
    pub prompt: String,
    /// 외부 투표 플랫폼의 폴 식별자
    pub poll_external_id: Option<String>,
    /// 절대 마감 시각 (서버 클록 기준 epoch 밀리초)
    pub deadline_ms: Option<i64>,
    /// 누적 투표 수
    pub votes: u64,
    /// 참여자 수
    pub voters: u64,
    /// 집계 결과
    pub results: PollResults,
    /// 투표 참여용 QR 코드 URL
    pub qr_code_url: Option<String>,
    /// 표시 위치
    pub position: Option<OverlayPosition>,
}

impl NormalizedPoll {
    /// 남은 시간(초)을 계산합니다.
    ///
    /// 카운트다운은 저장되지 않고 매 틱 보정된 현재 시각에서 유도됩니다:
    /// `max(0, ceil((deadline - effective_now) / 1000))`.
    pub fn seconds_left(&self, effective_now_ms: i64) -> Option<i64> {
        self.deadline_ms.map(|deadline| {
            let remaining = deadline - effective_now_ms;
            if remaining <= 0 {
                0
            } else {
                (remaining + 999) / 1000
            }
        })
    }

    /// 마감 시각이 지났는지 확인합니다.
    pub fn is_expired(&self, effective_now_ms: i64) -> bool {
        matches!(self.deadline_ms, Some(deadline) if effective_now_ms >= deadline)
    }
}

/// REST 부트스트랩이 반환하는 "현재 활성 폴" 스냅샷.
///
/// 마감(`deadline`)은 epoch 초 단위입니다. 참여자 수는 제공되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    /// 폴 ID
    pub id: String,
    /// 폴 질문 문구
    pub prompt: String,
    /// 외부 투표 플랫폼의 폴 식별자
    #[serde(default)]
    pub poll_id: Option<String>,
    /// 절대 마감 시각 (epoch 초)
    #[serde(default)]
    pub deadline: Option<i64>,
    /// 찬성(bull) 투표 수
    #[serde(default)]
    pub total_yes_votes: u64,
    /// 반대(bear) 투표 수
    #[serde(default)]
    pub total_no_votes: u64,
}
