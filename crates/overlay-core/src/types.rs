//! 공통 기본 타입.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 브랜드(테넌트) 식별자.
///
/// 오버레이 이벤트는 모두 브랜드 단위로 스코프됩니다. 하나의 오버레이
/// 프로세스가 여러 브랜드를 동시에 표시할 수 있으므로 모든 상태 맵의
/// 키로 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrandId(String);

impl BrandId {
    /// 새 브랜드 ID 생성.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 내부 문자열 반환.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BrandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BrandId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BrandId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 오버레이 요소의 화면 표시 위치.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    /// 좌측 상단
    TopLeft,
    /// 우측 상단
    TopRight,
    /// 좌측 하단
    BottomLeft,
    /// 우측 하단
    BottomRight,
    /// 중앙
    Center,
}

impl Default for OverlayPosition {
    fn default() -> Self {
        Self::BottomLeft
    }
}

impl fmt::Display for OverlayPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayPosition::TopLeft => write!(f, "top-left"),
            OverlayPosition::TopRight => write!(f, "top-right"),
            OverlayPosition::BottomLeft => write!(f, "bottom-left"),
            OverlayPosition::BottomRight => write!(f, "bottom-right"),
            OverlayPosition::Center => write!(f, "center"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_id_display() {
        let brand = BrandId::new("brand-42");
        assert_eq!(brand.to_string(), "brand-42");
        assert_eq!(brand.as_str(), "brand-42");
    }

    #[test]
    fn test_brand_id_serde_transparent() {
        let brand = BrandId::new("acme");
        let json = serde_json::to_string(&brand).unwrap();
        assert_eq!(json, "\"acme\"");

        let parsed: BrandId = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(parsed, brand);
    }

    #[test]
    fn test_position_serde_kebab_case() {
        let json = serde_json::to_string(&OverlayPosition::BottomRight).unwrap();
        assert_eq!(json, "\"bottom-right\"");

        let parsed: OverlayPosition = serde_json::from_str("\"top-left\"").unwrap();
        assert_eq!(parsed, OverlayPosition::TopLeft);
    }
}
