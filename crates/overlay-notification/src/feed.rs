//! 스트림 이벤트 → 알림 큐 연결.
//!
//! 팁/투표/거래/입장 이벤트를 구독해 알림 레코드로 변환하고 큐에
//! 넣습니다. 소비자의 브랜드 스코프와 다른 `brand_id`를 가진 이벤트는
//! 무시합니다 - 전송 계층이 룸 밖으로 브로드캐스트하더라도 교차 테넌트
//! 트래픽이 표시되지 않게 하는 브랜드 격리 규칙입니다.

use std::sync::Arc;

use tracing::debug;

use overlay_core::{BrandId, OverlayConfig, OverlayNotification};
use overlay_stream::{
    ConnectionManager, EventKind, ServerEvent, SubscriptionId, TipPayload, TradePayload,
    VotePayload,
};

use crate::queue::NotificationQueue;

/// 트랜지언트 이벤트 네 종류를 구독해 큐로 연결합니다.
///
/// 반환된 구독 ID들은 소비자 언마운트 시 `unsubscribe`에 사용합니다.
pub fn attach_notification_feed(
    manager: &ConnectionManager,
    brand: BrandId,
    queue: Arc<NotificationQueue>,
    config: &OverlayConfig,
) -> Vec<SubscriptionId> {
    let kinds = [
        EventKind::StreamJoined,
        EventKind::TipReceived,
        EventKind::VoteReceived,
        EventKind::TokenTraded,
    ];

    let ttl_ms = config.notification_ttl_ms;
    let position = config.notification_position;

    kinds
        .iter()
        .map(|kind| {
            let brand = brand.clone();
            let queue = queue.clone();
            manager.subscribe(
                *kind,
                Arc::new(move |event| {
                    let _span = overlay_core::overlay_span!("notification_feed", brand).entered();
                    if event.brand_id() != Some(&brand) {
                        debug!(event = %event.kind(), "브랜드 스코프 밖 이벤트 무시");
                        return;
                    }
                    if let Some(notification) = notification_from_event(event) {
                        queue.enqueue(notification.with_ttl_ms(ttl_ms).with_position(position));
                    }
                }),
            )
        })
        .collect()
}

/// 이벤트를 알림 레코드로 변환합니다.
///
/// 트랜지언트 팝업 대상이 아닌 이벤트(폴 제어, 에러)는 `None`.
fn notification_from_event(event: &ServerEvent) -> Option<OverlayNotification> {
    match event {
        ServerEvent::StreamJoined(join) => {
            let mut notification =
                OverlayNotification::new(&join.username).with_text("joined the stream");
            if let Some(picture) = &join.profile_picture {
                notification = notification.with_avatar_url(picture);
            }
            Some(notification)
        }
        ServerEvent::TipReceived(tip) => {
            let mut notification = OverlayNotification::new(&tip.username).with_text(tip_text(tip));
            if let Some(picture) = &tip.profile_picture {
                notification = notification.with_avatar_url(picture);
            }
            if let Some(message) = &tip.message {
                notification = notification.with_custom_message(message);
            }
            Some(notification)
        }
        ServerEvent::VoteReceived(vote) => {
            let mut notification =
                OverlayNotification::new(&vote.username).with_text(vote_text(vote));
            if let Some(picture) = &vote.profile_picture {
                notification = notification.with_avatar_url(picture);
            }
            Some(notification)
        }
        ServerEvent::TokenTraded(trade) => {
            let mut notification =
                OverlayNotification::new(&trade.username).with_text(trade_text(trade));
            if let Some(picture) = &trade.profile_picture {
                notification = notification.with_avatar_url(picture);
            }
            Some(notification)
        }
        _ => None,
    }
}

fn tip_text(tip: &TipPayload) -> String {
    match (&tip.amount, &tip.token) {
        (Some(amount), Some(token)) => format!("tipped {} {}", amount, token),
        (Some(amount), None) => format!("tipped {}", amount),
        _ => "sent a tip".to_string(),
    }
}

fn vote_text(vote: &VotePayload) -> String {
    match vote.vote.as_deref() {
        Some("bull") => "voted bull".to_string(),
        Some("bear") => "voted bear".to_string(),
        _ => "voted".to_string(),
    }
}

fn trade_text(trade: &TradePayload) -> String {
    let verb = match trade.side.as_deref() {
        Some("sell") => "sold",
        _ => "bought",
    };
    match (&trade.amount, &trade.token) {
        (Some(amount), Some(token)) => format!("{} {} {}", verb, amount, token),
        _ => format!("{} tokens", verb),
    }
}
