//! 스트림 서버 연결 및 이벤트 팬아웃.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - ConnectionManager: 프로세스당 하나의 지속 WebSocket 연결 소유
//! - 닫힌 이벤트 집합(`EventKind`)으로 키된 타입 구독 레지스트리
//! - 수신 이벤트의 콜백 팬아웃 (구독 순서 보장)
//! - 지수 백오프 + 지터 자동 재연결, 룸 재합류
//! - at-most-once 송신 (`emit`) - 단절 중에는 버퍼링 없이 폐기

pub mod connection;
pub mod error;
pub mod events;
pub mod registry;

pub use connection::ConnectionManager;
pub use error::*;
pub use events::*;
pub use registry::{EventCallback, SubscriptionId, SubscriptionRegistry};
