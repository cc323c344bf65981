//! 폴 상태 병합.
//!
//! REST 부트스트랩과 실시간 `start`/`update`/`end` 이벤트가 모두 하나의
//! 순수 함수 `reconcile`을 통과합니다. 부트스트랩은 합성 `start`처럼
//! 취급되어 병합 로직이 코드 경로마다 중복되지 않습니다.
//!
//! `None` 반환은 ABSENT(표시할 폴 없음)를 의미합니다.

use tracing::{debug, info, warn};

use overlay_core::{BrandId, NormalizedPoll, PollResults, PollSnapshot};
use overlay_stream::{PollEndPayload, PollStartPayload, PollUpdatePayload};

/// 폴 표시 단계.
///
/// ABSENT는 별도 변형 없이 상태 부재(`Option::None`)로 표현합니다.
#[derive(Debug, Clone, PartialEq)]
pub enum PollPhase {
    /// 마감 전 - 카운트다운 진행 중
    Active,
    /// 마감 후 - 결과가 동결된 채 유지 시간 동안 표시
    Closed {
        /// 마감이 감지된 시각 (보정된 epoch 밀리초)
        closed_at_ms: i64,
    },
}

/// 브랜드 하나의 현재 폴 상태.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// 정규화된 폴 뷰
    pub poll: NormalizedPoll,
    /// 표시 단계
    pub phase: PollPhase,
}

impl PollState {
    /// 카운트다운 진행 중인지 확인.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, PollPhase::Active)
    }
}

/// 폴 상태를 바꾸는 입력.
#[derive(Debug, Clone)]
pub enum PollInput {
    /// 실시간 폴 시작 이벤트
    Start(PollStartPayload),
    /// 실시간 폴 업데이트 이벤트
    Update(PollUpdatePayload),
    /// 실시간 폴 종료 이벤트 (권위적)
    End(PollEndPayload),
    /// REST 부트스트랩 스냅샷 (합성 start)
    Bootstrap(BrandId, PollSnapshot),
}

/// 현재 상태와 입력에서 다음 상태를 계산하는 순수 함수.
///
/// 어떤 입력도 에러를 내지 않습니다 - 늦거나 비정형인 이벤트는 로그만
/// 남기고 현재 상태를 유지합니다.
pub fn reconcile(current: Option<&PollState>, input: PollInput, now_ms: i64) -> Option<PollState> {
    match input {
        PollInput::Start(start) => apply_start(current, start, now_ms),
        PollInput::Update(update) => apply_update(current, update),
        PollInput::End(end) => apply_end(current, end, now_ms),
        PollInput::Bootstrap(brand, snapshot) => apply_bootstrap(current, brand, snapshot, now_ms),
    }
}

/// 시계 진행에 따른 전이: 마감 감지(ACTIVE → CLOSED)와 유지 시간 만료
/// (CLOSED → ABSENT)를 처리합니다.
pub fn advance_clock(current: Option<&PollState>, now_ms: i64, hold_ms: i64) -> Option<PollState> {
    let state = current?;
    match state.phase {
        PollPhase::Active => {
            if state.poll.is_expired(now_ms) {
                info!(poll = %state.poll.id, "폴 마감 - 결과 동결");
                Some(PollState {
                    poll: state.poll.clone(),
                    phase: PollPhase::Closed {
                        closed_at_ms: now_ms,
                    },
                })
            } else {
                Some(state.clone())
            }
        }
        PollPhase::Closed { closed_at_ms } => {
            if now_ms - closed_at_ms >= hold_ms {
                info!(poll = %state.poll.id, "결과 유지 시간 종료 - 폴 제거");
                None
            } else {
                Some(state.clone())
            }
        }
    }
}

fn apply_start(
    current: Option<&PollState>,
    start: PollStartPayload,
    now_ms: i64,
) -> Option<PollState> {
    // 겹치는 폴: 마지막 start가 이긴다
    let external_id = match current {
        Some(state) if state.is_active() && state.poll.id != start.id => {
            warn!(
                previous = %state.poll.id,
                next = %start.id,
                "진행 중인 폴을 새 start로 교체"
            );
            None
        }
        Some(state) if state.poll.id == start.id => state.poll.poll_external_id.clone(),
        _ => None,
    };

    let poll = NormalizedPoll {
        id: start.id,
        brand_id: start.brand_id,
        prompt: start.poll_question,
        poll_external_id: external_id,
        deadline_ms: Some(start.end_time_ms),
        votes: start.votes,
        voters: start.voters,
        results: start.results,
        qr_code_url: start.qr_code_url,
        position: start.position,
    };

    // 이미 지난 마감으로 시작하면 곧바로 동결 상태로 표시
    let phase = if poll.is_expired(now_ms) {
        debug!(poll = %poll.id, "이미 마감된 start - CLOSED로 진입");
        PollPhase::Closed {
            closed_at_ms: now_ms,
        }
    } else {
        PollPhase::Active
    };

    Some(PollState { poll, phase })
}

fn apply_update(current: Option<&PollState>, update: PollUpdatePayload) -> Option<PollState> {
    let state = match current {
        Some(state) => state,
        None => {
            // start보다 먼저 도착한(또는 종료 후 낙오한) update는 no-op
            debug!(poll = %update.id, "활성 폴 없음 - update 무시");
            return None;
        }
    };

    if !state.is_active() {
        debug!(poll = %state.poll.id, "마감된 폴에 대한 update 무시");
        return Some(state.clone());
    }

    if state.poll.id != update.id {
        debug!(
            current = %state.poll.id,
            incoming = %update.id,
            "다른 폴에 대한 update 무시"
        );
        return Some(state.clone());
    }

    let mut poll = state.poll.clone();
    poll.votes = update.votes;
    poll.voters = update.voters;
    poll.results = update.results;
    if let Some(position) = update.position {
        poll.position = Some(position);
    }
    // 서버 측 시간 연장: 새 마감이 실려 올 때만 교체
    if let Some(end_time_ms) = update.end_time_ms {
        poll.deadline_ms = Some(end_time_ms);
    }

    Some(PollState {
        poll,
        phase: PollPhase::Active,
    })
}

fn apply_end(current: Option<&PollState>, end: PollEndPayload, now_ms: i64) -> Option<PollState> {
    let state = match current {
        Some(state) => state,
        None => {
            // 표시 중인 폴이 없으면 닫을 것도 없다
            debug!(poll = %end.id, "활성 폴 없음 - end 무시");
            return None;
        }
    };

    if state.poll.id != end.id {
        warn!(
            current = %state.poll.id,
            incoming = %end.id,
            "다른 폴에 대한 end 무시"
        );
        return Some(state.clone());
    }

    let mut poll = state.poll.clone();
    poll.votes = end.votes;
    poll.voters = end.voters;
    poll.results = end.results;

    info!(poll = %poll.id, "end 이벤트 수신 - 폴 조기 종료");
    Some(PollState {
        poll,
        phase: PollPhase::Closed {
            closed_at_ms: now_ms,
        },
    })
}

fn apply_bootstrap(
    current: Option<&PollState>,
    brand: BrandId,
    snapshot: PollSnapshot,
    now_ms: i64,
) -> Option<PollState> {
    // 부트스트랩은 마운트 직후 1회 - 실시간 이벤트가 먼저 도착해 상태를
    // 만들었다면 그쪽이 더 최신이다
    if let Some(state) = current {
        debug!(poll = %state.poll.id, "이미 실시간 상태 존재 - 부트스트랩 무시");
        return Some(state.clone());
    }

    let deadline_ms = snapshot.deadline.map(|secs| secs * 1_000);
    let votes = snapshot.total_yes_votes + snapshot.total_no_votes;
    let poll = NormalizedPoll {
        id: snapshot.id,
        brand_id: brand,
        prompt: snapshot.prompt,
        poll_external_id: snapshot.poll_id,
        deadline_ms,
        votes,
        // 부트스트랩은 참여자 수를 따로 제공하지 않는다
        voters: votes,
        results: PollResults::from_counts(snapshot.total_yes_votes, snapshot.total_no_votes),
        qr_code_url: None,
        position: None,
    };

    if poll.is_expired(now_ms) {
        debug!(poll = %poll.id, "부트스트랩 폴이 이미 마감 - 표시하지 않음");
        return None;
    }

    info!(poll = %poll.id, "부트스트랩으로 활성 폴 복원");
    Some(PollState {
        poll,
        phase: PollPhase::Active,
    })
}
