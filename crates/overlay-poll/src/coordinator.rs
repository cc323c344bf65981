//! 센티먼트 폴 조정자.
//!
//! 브랜드별 폴 상태를 보관하고, 실시간 이벤트와 REST 부트스트랩을
//! `reconcile`로 병합하며, 보정된 시계로 1Hz 카운트다운 틱을 발행합니다.
//! 틱은 마운트 시점 기준 고정 간격이 아니라 벽시계 초 경계에 정렬되어
//! 드리프트가 누적되지 않습니다.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use overlay_api::{Clock, OverlayApiClient};
use overlay_core::{BrandId, NormalizedPoll, OverlayConfig};
use overlay_stream::{ConnectionManager, EventKind, ServerEvent, SubscriptionId};

use crate::reconcile::{advance_clock, reconcile, PollInput, PollPhase, PollState};

/// 카운트다운 틱.
///
/// 표시 계층은 이 레코드만으로 폴 패널을 그립니다.
#[derive(Debug, Clone)]
pub struct PollTick {
    /// 대상 브랜드
    pub brand_id: BrandId,
    /// 현재 폴 (ABSENT면 `None`)
    pub poll: Option<NormalizedPoll>,
    /// 표시 단계
    pub phase: Option<PollPhase>,
    /// 남은 시간(초) - CLOSED는 0으로 동결, ABSENT는 `None`
    pub seconds_left: Option<i64>,
    /// 틱 계산에 쓰인 보정 시각 (epoch 밀리초)
    pub effective_now_ms: i64,
}

/// 브랜드별 폴 상태를 관리하는 조정자.
///
/// 명시적으로 생성해 `Arc`로 공유합니다. 이벤트 콜백과 틱 태스크가
/// 같은 인스턴스를 참조합니다.
pub struct PollCoordinator {
    polls: RwLock<HashMap<BrandId, PollState>>,
    brands: RwLock<HashSet<BrandId>>,
    clock: Arc<dyn Clock>,
    hold_ms: i64,
    tick_tx: broadcast::Sender<PollTick>,
}

impl PollCoordinator {
    /// 새 조정자 생성.
    pub fn new(clock: Arc<dyn Clock>, config: &OverlayConfig) -> Arc<Self> {
        let (tick_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            polls: RwLock::new(HashMap::new()),
            brands: RwLock::new(HashSet::new()),
            clock,
            hold_ms: config.poll_hold_secs as i64 * 1_000,
            tick_tx,
        })
    }

    /// 브랜드 스코프를 등록합니다. 등록되지 않은 브랜드의 이벤트는
    /// 무시됩니다 (브랜드 격리).
    pub fn register_brand(&self, brand: BrandId) {
        self.brands.write().expect("brands lock poisoned").insert(brand);
    }

    /// 브랜드 스코프를 해제하고 상태를 정리합니다.
    pub fn deregister_brand(&self, brand: &BrandId) {
        self.brands.write().expect("brands lock poisoned").remove(brand);
        self.polls.write().expect("polls lock poisoned").remove(brand);
    }

    /// 브랜드의 현재 폴 상태.
    pub fn current(&self, brand: &BrandId) -> Option<PollState> {
        self.polls
            .read()
            .expect("polls lock poisoned")
            .get(brand)
            .cloned()
    }

    /// 폴 표시를 명시적으로 해제합니다 (ABSENT로 전이).
    pub fn dismiss(&self, brand: &BrandId) -> bool {
        let removed = self
            .polls
            .write()
            .expect("polls lock poisoned")
            .remove(brand)
            .is_some();
        if removed {
            self.publish(brand);
        }
        removed
    }

    /// 카운트다운 틱 수신기.
    pub fn subscribe_ticks(&self) -> broadcast::Receiver<PollTick> {
        self.tick_tx.subscribe()
    }

    /// REST 부트스트랩: "지금 활성 폴이 있는가"를 1회 조회해 상태를
    /// 시드합니다. 실패는 "활성 폴 없음"으로 강등됩니다.
    pub async fn bootstrap(&self, api: &OverlayApiClient, brand: &BrandId) {
        self.register_brand(brand.clone());

        match api.active_poll_or_none(brand).await {
            Some(snapshot) => {
                let now = self.clock.now_ms();
                self.apply(brand, PollInput::Bootstrap(brand.clone(), snapshot), now);
            }
            None => {
                debug!(brand = %brand, "부트스트랩: 활성 폴 없음");
            }
        }
    }

    /// 수신 이벤트 처리. 폴 관련이 아니거나 스코프 밖 브랜드면 no-op.
    pub fn handle_event(&self, event: &ServerEvent) {
        let (brand, input) = match event {
            ServerEvent::StartSentimentPoll(payload) => {
                (payload.brand_id.clone(), PollInput::Start(payload.clone()))
            }
            ServerEvent::UpdateSentimentPoll(payload) => {
                (payload.brand_id.clone(), PollInput::Update(payload.clone()))
            }
            ServerEvent::EndSentimentPoll(payload) => {
                (payload.brand_id.clone(), PollInput::End(payload.clone()))
            }
            _ => return,
        };

        let registered = self
            .brands
            .read()
            .expect("brands lock poisoned")
            .contains(&brand);
        if !registered {
            debug!(brand = %brand, event = %event.kind(), "스코프 밖 브랜드의 폴 이벤트 무시");
            return;
        }

        self.apply(&brand, input, self.clock.now_ms());
    }

    /// 폴 이벤트 세 종류를 연결 관리자에 구독합니다.
    ///
    /// 반환된 구독 ID들은 언마운트 시 `unsubscribe`에 사용합니다.
    pub fn attach(self: &Arc<Self>, manager: &ConnectionManager) -> Vec<SubscriptionId> {
        [
            EventKind::StartSentimentPoll,
            EventKind::UpdateSentimentPoll,
            EventKind::EndSentimentPoll,
        ]
        .iter()
        .map(|kind| {
            let this = Arc::clone(self);
            manager.subscribe(*kind, Arc::new(move |event| this.handle_event(event)))
        })
        .collect()
    }

    /// 시계 진행 전이를 1회 수행하고 모든 브랜드의 틱을 발행합니다.
    pub fn tick_once(&self) {
        let now = self.clock.now_ms();
        let brands: Vec<BrandId> = {
            self.polls
                .read()
                .expect("polls lock poisoned")
                .keys()
                .cloned()
                .collect()
        };

        for brand in brands {
            {
                let mut polls = self.polls.write().expect("polls lock poisoned");
                let next = advance_clock(polls.get(&brand), now, self.hold_ms);
                match next {
                    Some(state) => {
                        polls.insert(brand.clone(), state);
                    }
                    None => {
                        polls.remove(&brand);
                    }
                }
            }
            self.publish(&brand);
        }
    }

    /// 벽시계 초 경계에 정렬된 1Hz 카운트다운 태스크를 생성합니다.
    pub fn spawn_countdown(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let delay = next_tick_delay_ms(this.clock.now_ms());
                tokio::time::sleep(Duration::from_millis(delay)).await;
                this.tick_once();
            }
        })
    }

    fn apply(&self, brand: &BrandId, input: PollInput, now_ms: i64) {
        {
            let mut polls = self.polls.write().expect("polls lock poisoned");
            let next = reconcile(polls.get(brand), input, now_ms);
            match next {
                Some(state) => {
                    polls.insert(brand.clone(), state);
                }
                None => {
                    polls.remove(brand);
                }
            }
        }
        self.publish(brand);
    }

    /// 브랜드의 현재 상태를 틱으로 발행합니다. 수신자가 없으면 조용히
    /// 버려집니다.
    fn publish(&self, brand: &BrandId) {
        let now = self.clock.now_ms();
        let state = self.current(brand);
        let seconds_left = state.as_ref().and_then(|s| match s.phase {
            PollPhase::Active => s.poll.seconds_left(now),
            PollPhase::Closed { .. } => Some(0),
        });

        let _ = self.tick_tx.send(PollTick {
            brand_id: brand.clone(),
            poll: state.as_ref().map(|s| s.poll.clone()),
            phase: state.map(|s| s.phase),
            seconds_left,
            effective_now_ms: now,
        });
    }
}

/// 다음 벽시계 초 경계까지의 대기 시간(밀리초).
pub(crate) fn next_tick_delay_ms(now_ms: i64) -> u64 {
    (1_000 - now_ms.rem_euclid(1_000)) as u64
}
