//! 이벤트 구독 레지스트리.
//!
//! 이벤트 종류별로 정렬된 콜백 목록을 보관하고, 수신 이벤트 하나를
//! 등록된 모든 콜백에 팬아웃합니다. 저수준 디스패치 경로는 이벤트
//! 종류당 정확히 하나만 존재합니다 - 단일 리더 태스크가 `EventKind`
//! 인덱스 테이블을 조회하는 구조라 콜백이 몇 개 등록되든 변하지
//! 않습니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::events::{EventKind, ServerEvent};

/// 이벤트 콜백.
///
/// 디스패치는 단일 리더 태스크에서 순차 실행되므로 콜백 내부에서
/// 블로킹하면 안 됩니다.
pub type EventCallback = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// 구독 해제에 사용하는 핸들.
///
/// 클로저는 동등성 비교가 불가능하므로 `subscribe`가 발급한 ID로
/// 해제합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    kind: EventKind,
    seq: u64,
}

impl SubscriptionId {
    /// 구독 대상 이벤트 종류.
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Slot {
    seq: u64,
    callback: EventCallback,
}

/// 이벤트 종류별 구독자 테이블.
pub struct SubscriptionRegistry {
    slots: RwLock<[Vec<Slot>; EventKind::COUNT]>,
    next_seq: AtomicU64,
}

impl SubscriptionRegistry {
    /// 빈 레지스트리 생성.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(std::array::from_fn(|_| Vec::new())),
            next_seq: AtomicU64::new(1),
        }
    }

    /// 콜백을 해당 이벤트 종류의 목록 끝에 추가합니다.
    ///
    /// 디스패치는 구독 순서를 따릅니다.
    pub fn subscribe(&self, kind: EventKind, callback: EventCallback) -> SubscriptionId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots.write().expect("registry lock poisoned");
        slots[kind.index()].push(Slot { seq, callback });
        debug!(event = %kind, callbacks = slots[kind.index()].len(), "콜백 구독");
        SubscriptionId { kind, seq }
    }

    /// 콜백을 제거합니다. 제거됐으면 `true`를 반환합니다.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut slots = self.slots.write().expect("registry lock poisoned");
        let list = &mut slots[id.kind.index()];
        let before = list.len();
        list.retain(|slot| slot.seq != id.seq);
        let removed = list.len() < before;
        if removed {
            debug!(event = %id.kind, callbacks = list.len(), "콜백 구독 해제");
        }
        removed
    }

    /// 이벤트를 해당 종류의 모든 콜백에 전달하고 호출 수를 반환합니다.
    ///
    /// 콜백 실행 중 락을 잡지 않도록 목록을 복사한 뒤 호출합니다 -
    /// 콜백 내부에서 subscribe/unsubscribe를 해도 교착하지 않습니다.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let callbacks: Vec<EventCallback> = {
            let slots = self.slots.read().expect("registry lock poisoned");
            slots[event.kind().index()]
                .iter()
                .map(|slot| Arc::clone(&slot.callback))
                .collect()
        };

        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// 해당 종류에 등록된 콜백 수.
    pub fn callback_count(&self, kind: EventKind) -> usize {
        self.slots.read().expect("registry lock poisoned")[kind.index()].len()
    }

    /// 해당 종류에 구독자가 있는지 확인.
    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.callback_count(kind) > 0
    }

    /// 모든 구독을 제거합니다.
    pub fn clear(&self) {
        let mut slots = self.slots.write().expect("registry lock poisoned");
        for list in slots.iter_mut() {
            list.clear();
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
