//! # Overlay Core
//!
//! 스트림 오버레이 클라이언트의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 오버레이 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 브랜드 및 표시 위치 타입
//! - 알림(팝업) 레코드
//! - 센티먼트 폴 도메인 구조체
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
