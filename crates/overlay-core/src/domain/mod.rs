//! 오버레이 도메인 모델.

pub mod notification;
pub mod poll;

pub use notification::*;
pub use poll::*;
