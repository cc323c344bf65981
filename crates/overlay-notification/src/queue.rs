//! 알림 큐.
//!
//! "정확히 하나만 활성" 불변식은 암묵적 반응이 아니라 단일 가드 함수
//! `try_advance`로 구현됩니다. enqueue와 dismiss 양쪽에서 호출되므로
//! 버스트 이후에도 스스로 회복합니다.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use overlay_core::OverlayNotification;

struct QueueState {
    active: Option<OverlayNotification>,
    backlog: VecDeque<OverlayNotification>,
}

/// 트랜지언트 알림의 FIFO 큐.
///
/// 큐가 레코드를 독점 소유합니다. 소비자(렌더러)는 `watch_active()`로
/// 활성 슬롯의 변화만 관찰합니다.
pub struct NotificationQueue {
    state: Mutex<QueueState>,
    active_tx: watch::Sender<Option<OverlayNotification>>,
}

impl NotificationQueue {
    /// 빈 큐 생성.
    pub fn new() -> Self {
        let (active_tx, _) = watch::channel(None);
        Self {
            state: Mutex::new(QueueState {
                active: None,
                backlog: VecDeque::new(),
            }),
            active_tx,
        }
    }

    /// 알림을 큐 끝에 추가하고 발급된 ID를 반환합니다.
    ///
    /// 활성 슬롯이 비어 있으면 즉시 활성화됩니다. 이미 표시 중인
    /// 알림을 새 알림이 가로채는 일은 없습니다.
    pub fn enqueue(&self, notification: OverlayNotification) -> String {
        let id = notification.id.clone();
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.backlog.push_back(notification);
        debug!(id = %id, backlog = state.backlog.len(), "알림 추가");
        self.try_advance(&mut state);
        id
    }

    /// ID로 알림을 제거합니다. 제거됐으면 `true`를 반환합니다.
    ///
    /// 활성 알림이 해제되면 백로그 선두가 곧바로 활성화됩니다.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut state = self.state.lock().expect("queue lock poisoned");

        if state.active.as_ref().is_some_and(|n| n.id == id) {
            state.active = None;
            debug!(id = %id, "활성 알림 해제");
            self.try_advance(&mut state);
            return true;
        }

        let before = state.backlog.len();
        state.backlog.retain(|n| n.id != id);
        state.backlog.len() < before
    }

    /// 현재 활성 알림.
    pub fn active(&self) -> Option<OverlayNotification> {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .active
            .clone()
    }

    /// 백로그 길이 (활성 알림 제외).
    pub fn backlog_len(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").backlog.len()
    }

    /// 활성 슬롯 변화를 관찰하는 watch 수신기.
    pub fn watch_active(&self) -> watch::Receiver<Option<OverlayNotification>> {
        self.active_tx.subscribe()
    }

    /// 모든 알림을 제거합니다.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.backlog.clear();
        state.active = None;
        let _ = self.active_tx.send(None);
    }

    /// 단일 가드 함수: 활성 슬롯이 비어 있고 백로그가 있으면 선두를
    /// 활성화합니다. 그 외에는 아무것도 하지 않습니다.
    fn try_advance(&self, state: &mut QueueState) {
        if state.active.is_some() {
            return;
        }
        if let Some(next) = state.backlog.pop_front() {
            debug!(id = %next.id, "알림 활성화");
            state.active = Some(next.clone());
            let _ = self.active_tx.send(Some(next));
        } else {
            let _ = self.active_tx.send(None);
        }
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// 활성 알림을 TTL 경과 후 자동 해제하는 태스크를 생성합니다.
///
/// `ttl_ms == 0`인 알림은 수동 해제 전까지 유지됩니다. 활성 알림이
/// TTL 도중 수동으로 해제되면 타이머는 새 활성 알림으로 넘어갑니다.
pub fn spawn_auto_dismiss(queue: Arc<NotificationQueue>) -> JoinHandle<()> {
    let mut rx = queue.watch_active();
    tokio::spawn(async move {
        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                Some(notification) if notification.ttl_ms > 0 => {
                    let ttl = Duration::from_millis(notification.ttl_ms);
                    tokio::select! {
                        _ = tokio::time::sleep(ttl) => {
                            queue.dismiss(&notification.id);
                        }
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                _ => {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn notification(username: &str) -> OverlayNotification {
        OverlayNotification::new(username)
    }

    #[test]
    fn test_first_enqueue_becomes_active() {
        let queue = NotificationQueue::new();
        let id = queue.enqueue(notification("alice"));

        let active = queue.active().expect("활성 알림이 있어야 함");
        assert_eq!(active.id, id);
        assert_eq!(queue.backlog_len(), 0);
    }

    #[test]
    fn test_exactly_one_active_in_fifo_order() {
        let queue = NotificationQueue::new();
        let a = queue.enqueue(notification("a"));
        let b = queue.enqueue(notification("b"));
        let c = queue.enqueue(notification("c"));

        // 버스트 직후: a만 활성, 나머지는 백로그
        assert_eq!(queue.active().unwrap().id, a);
        assert_eq!(queue.backlog_len(), 2);

        queue.dismiss(&a);
        assert_eq!(queue.active().unwrap().id, b);

        queue.dismiss(&b);
        assert_eq!(queue.active().unwrap().id, c);

        queue.dismiss(&c);
        assert!(queue.active().is_none());
        assert_eq!(queue.backlog_len(), 0);
    }

    #[test]
    fn test_new_enqueue_never_interrupts_active() {
        let queue = NotificationQueue::new();
        let first = queue.enqueue(notification("first"));
        queue.enqueue(notification("second"));

        assert_eq!(
            queue.active().unwrap().id,
            first,
            "표시 중인 알림은 새 알림에 가로채이지 않아야 함"
        );
    }

    #[test]
    fn test_dismiss_backlog_entry_keeps_active() {
        let queue = NotificationQueue::new();
        let a = queue.enqueue(notification("a"));
        let b = queue.enqueue(notification("b"));
        let c = queue.enqueue(notification("c"));

        assert!(queue.dismiss(&b));
        assert_eq!(queue.active().unwrap().id, a);

        queue.dismiss(&a);
        assert_eq!(queue.active().unwrap().id, c, "b는 건너뛰어야 함");
    }

    #[test]
    fn test_dismiss_unknown_id_is_noop() {
        let queue = NotificationQueue::new();
        queue.enqueue(notification("a"));
        assert!(!queue.dismiss("no-such-id"));
        assert!(queue.active().is_some());
    }

    #[test]
    fn test_duplicates_are_not_coalesced() {
        let queue = NotificationQueue::new();
        let first = queue.enqueue(notification("same"));
        let second = queue.enqueue(notification("same"));
        assert_ne!(first, second);

        queue.dismiss(&first);
        assert_eq!(
            queue.active().unwrap().id,
            second,
            "같은 내용의 알림도 각각 표시되어야 함"
        );
    }

    #[test]
    fn test_watch_publishes_active_changes() {
        let queue = NotificationQueue::new();
        let rx = queue.watch_active();
        assert!(rx.borrow().is_none());

        let id = queue.enqueue(notification("a"));
        assert_eq!(rx.borrow().as_ref().unwrap().id, id);

        queue.dismiss(&id);
        assert!(rx.borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_dismiss_advances_queue() {
        let queue = Arc::new(NotificationQueue::new());
        let first = queue.enqueue(OverlayNotification::new("a").with_ttl_ms(1_000));
        let second = queue.enqueue(OverlayNotification::new("b").with_ttl_ms(1_000));

        let _task = spawn_auto_dismiss(queue.clone());
        tokio::task::yield_now().await;

        assert_eq!(queue.active().unwrap().id, first);

        // TTL 경과 - 첫 알림이 자동 해제되고 다음이 활성화된다
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(queue.active().unwrap().id, second);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(queue.active().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sticky_notification_waits_for_manual_dismiss() {
        let queue = Arc::new(NotificationQueue::new());
        let sticky = queue.enqueue(OverlayNotification::new("pinned").with_ttl_ms(0));

        let _task = spawn_auto_dismiss(queue.clone());
        tokio::task::yield_now().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(
            queue.active().unwrap().id,
            sticky,
            "ttl 0은 자동 해제되지 않아야 함"
        );

        queue.dismiss(&sticky);
        assert!(queue.active().is_none());
    }

    proptest! {
        /// 어떤 enqueue 순서든 활성화 순서는 정확히 FIFO다.
        #[test]
        fn prop_activation_order_is_fifo(count in 1usize..20) {
            let queue = NotificationQueue::new();
            let ids: Vec<String> = (0..count)
                .map(|i| queue.enqueue(OverlayNotification::new(format!("user-{}", i))))
                .collect();

            let mut observed = Vec::new();
            while let Some(active) = queue.active() {
                observed.push(active.id.clone());
                queue.dismiss(&active.id);
            }

            prop_assert_eq!(observed, ids);
        }
    }
}
