//! 시계 동기화.
//!
//! 서버 시계와 로컬 시계의 오프셋을 왕복 시간(RTT) 중간점 보정으로
//! 추정합니다. 모든 카운트다운은 `effective_now = local_now + offset`을
//! 사용하므로, 시스템 시계가 제각각인 시청자들도 네트워크 지터 범위
//! 안에서 같은 카운트다운을 보게 됩니다.
//!
//! 동기화는 연속적이 아니라 기회적으로 수행됩니다 - 라운드가 완료될
//! 때마다 오프셋이 갱신되고, 실패하면 기존 추정치(초기값 0)를 그대로
//! 유지합니다. 실패한 동기화가 카운트다운을 중단시키는 일은 없습니다.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use overlay_core::ApiConfig;

use crate::{ApiError, ApiResult};

/// 카운트다운 계산에 쓰이는 시계 추상화.
///
/// 운영 코드는 `TimeSync`를, 테스트는 수동 시계를 주입합니다.
pub trait Clock: Send + Sync {
    /// 보정된 현재 시각 (epoch 밀리초).
    fn now_ms(&self) -> i64;
}

/// 보정 없는 로컬 시스템 시계.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// 시간 엔드포인트 응답.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeResponse {
    server_now_ms: i64,
}

/// 서버-로컬 시계 오프셋 추정기.
pub struct TimeSync {
    base_url: String,
    client: Client,
    offset_ms: AtomicI64,
}

impl TimeSync {
    /// 새 동기화기 생성. 초기 오프셋은 0(로컬 시계 그대로)입니다.
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
            offset_ms: AtomicI64::new(0),
        })
    }

    /// 현재 오프셋 추정치 (`server_clock - local_clock`, 밀리초).
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    /// 보정된 현재 시각 (epoch 밀리초).
    pub fn effective_now_ms(&self) -> i64 {
        Utc::now().timestamp_millis() + self.offset_ms()
    }

    /// 동기화 라운드를 한 번 수행하고 현재 오프셋을 반환합니다.
    ///
    /// 시간 엔드포인트가 실패하면 아무 응답의 `Date` 헤더로 폴백하고,
    /// 그것도 실패하면 기존 오프셋을 유지합니다 (fail-open).
    pub async fn sync(&self) -> i64 {
        match self.sync_time_endpoint().await {
            Ok(offset) => {
                self.offset_ms.store(offset, Ordering::Relaxed);
                debug!(offset_ms = offset, "시계 오프셋 갱신");
                offset
            }
            Err(endpoint_err) => {
                debug!("시간 엔드포인트 실패 - Date 헤더 폴백: {}", endpoint_err);
                match self.sync_date_header().await {
                    Ok(offset) => {
                        self.offset_ms.store(offset, Ordering::Relaxed);
                        debug!(offset_ms = offset, "Date 헤더로 시계 오프셋 갱신");
                        offset
                    }
                    Err(fallback_err) => {
                        warn!(
                            "시간 동기화 실패 - 로컬 시계로 동작: {} / {}",
                            endpoint_err, fallback_err
                        );
                        self.offset_ms()
                    }
                }
            }
        }
    }

    /// `GET /api/time` 기반 동기화.
    ///
    /// `client_midpoint = local_after - rtt/2`,
    /// `offset = server_now - client_midpoint`.
    async fn sync_time_endpoint(&self) -> ApiResult<i64> {
        let url = format!("{}/api/time", self.base_url);

        let local_before = Utc::now().timestamp_millis();
        let response = self.client.get(&url).send().await.map_err(ApiError::from)?;
        let local_after = Utc::now().timestamp_millis();

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                code: status.as_u16(),
                message: format!("time endpoint returned {}", status),
            });
        }

        let body: TimeResponse = response.json().await.map_err(|e| ApiError::Parse(e.to_string()))?;

        let rtt = local_after - local_before;
        let midpoint = local_after - rtt / 2;
        Ok(body.server_now_ms - midpoint)
    }

    /// 응답 `Date` 헤더 기반 폴백 동기화 (초 단위 정밀도).
    async fn sync_date_header(&self) -> ApiResult<i64> {
        let local_before = Utc::now().timestamp_millis();
        let response = self
            .client
            .head(&self.base_url)
            .send()
            .await
            .map_err(ApiError::from)?;
        let local_after = Utc::now().timestamp_millis();

        let date = response
            .headers()
            .get(reqwest::header::DATE)
            .ok_or_else(|| ApiError::Parse("Date 헤더 없음".to_string()))?;
        let date_str = date
            .to_str()
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        let server_now = DateTime::parse_from_rfc2822(date_str)
            .map_err(|e| ApiError::Parse(format!("Date 헤더 파싱 실패: {}", e)))?
            .timestamp_millis();

        let rtt = local_after - local_before;
        let midpoint = local_after - rtt / 2;
        Ok(server_now - midpoint)
    }

    /// 주기적 재동기화 태스크를 생성합니다.
    pub fn spawn_resync(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                this.sync().await;
            }
        })
    }
}

impl Clock for TimeSync {
    fn now_ms(&self) -> i64 {
        self.effective_now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: String) -> ApiConfig {
        ApiConfig {
            base_url,
            timeout_secs: 2,
            time_sync_interval_secs: 300,
        }
    }

    #[tokio::test]
    async fn test_offset_estimation_matches_server_skew() {
        let mut server = mockito::Server::new_async().await;
        // 서버 시계가 로컬보다 5초 빠른 상황
        let skewed_now = Utc::now().timestamp_millis() + 5_000;
        let _mock = server
            .mock("GET", "/api/time")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"serverNowMs":{}}}"#, skewed_now))
            .create_async()
            .await;

        let sync = TimeSync::new(&test_config(server.url())).unwrap();
        let offset = sync.sync().await;

        // 로컬 mockito 왕복이므로 RTT 보정 오차는 수백 ms 이내
        assert!(
            (offset - 5_000).abs() < 500,
            "offset {}ms는 5000ms 근처여야 함",
            offset
        );
        assert_eq!(sync.offset_ms(), offset);

        // 보정된 시각은 로컬보다 오프셋만큼 앞서야 함
        let drift = sync.effective_now_ms() - Utc::now().timestamp_millis() - offset;
        assert!(drift.abs() < 100);
    }

    #[tokio::test]
    async fn test_sync_failure_keeps_offset_zero() {
        // 아무것도 듣지 않는 포트 - 연결 거부
        let config = test_config("http://127.0.0.1:9".to_string());
        let sync = TimeSync::new(&config).unwrap();

        let offset = sync.sync().await;
        assert_eq!(offset, 0, "동기화 실패는 오프셋 0으로 강등되어야 함");
        assert_eq!(sync.offset_ms(), 0);
    }

    #[tokio::test]
    async fn test_date_header_fallback() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/time")
            .with_status(404)
            .create_async()
            .await;
        // 과거 시각이 박힌 Date 헤더 - 큰 음수 오프셋이 나와야 함
        let _mock = server
            .mock("HEAD", "/")
            .with_status(200)
            .with_header("Date", "Mon, 01 Jan 2024 00:00:00 GMT")
            .create_async()
            .await;

        let sync = TimeSync::new(&test_config(server.url())).unwrap();
        let offset = sync.sync().await;

        let expected = DateTime::parse_from_rfc2822("Mon, 01 Jan 2024 00:00:00 GMT")
            .unwrap()
            .timestamp_millis()
            - Utc::now().timestamp_millis();
        assert!(
            (offset - expected).abs() < 1_000,
            "offset {}ms는 Date 헤더 기준 {}ms 근처여야 함",
            offset,
            expected
        );
        assert!(offset < 0);
    }
}
