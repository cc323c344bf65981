//! 오버레이 REST API 클라이언트.
//!
//! 오버레이 마운트 시 "이 브랜드에 지금 활성 폴이 있는가"를 한 번
//! 조회하는 부트스트랩 경로를 제공합니다.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, warn};

use overlay_core::{ApiConfig, BrandId, PollSnapshot};

use crate::{ApiError, ApiResult};

/// 활성 폴 부트스트랩 응답.
///
/// `{ "data": null }`이면 활성 폴 없음.
#[derive(Debug, Deserialize)]
struct ActivePollResponse {
    data: Option<PollSnapshot>,
}

/// 오버레이 REST API 클라이언트.
pub struct OverlayApiClient {
    base_url: String,
    client: Client,
}

impl OverlayApiClient {
    /// 새 API 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ApiError::Network`를 반환합니다.
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ApiError::Network(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// 브랜드의 현재 활성 센티먼트 폴 조회.
    pub async fn get_active_poll(&self, brand: &BrandId) -> ApiResult<Option<PollSnapshot>> {
        let url = format!(
            "{}/api/brands/{}/sentiment-poll/active",
            self.base_url, brand
        );
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(ApiError::from)?;
        let body: ActivePollResponse = Self::handle_response(response).await?;
        Ok(body.data)
    }

    /// 부트스트랩 조회의 fail-open 래퍼.
    ///
    /// 네트워크/파싱 실패는 "활성 폴 없음"으로 폴백합니다 - 부트스트랩
    /// 실패가 오버레이 렌더링을 막아서는 안 됩니다.
    pub async fn active_poll_or_none(&self, brand: &BrandId) -> Option<PollSnapshot> {
        match self.get_active_poll(brand).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(brand = %brand, "활성 폴 부트스트랩 실패 - 없음으로 처리: {}", e);
                None
            }
        }
    }

    /// API 응답 처리.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| {
                error!("Failed to parse response: {} - Body: {}", e, body);
                ApiError::Parse(e.to_string())
            })
        } else {
            Err(ApiError::Status {
                code: status.as_u16(),
                message: body,
            })
        }
    }
}
