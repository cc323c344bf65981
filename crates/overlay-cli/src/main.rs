//! 오버레이 클라이언트 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 브랜드 스트림에 시청자로 참여해 이벤트/카운트다운 출력
//! overlay watch -b brand-1 -u viewer-42
//!
//! # 모더레이터: 60초짜리 센티먼트 폴 시작
//! overlay poll start -b brand-1 -q "Will SOL pump?" --duration-secs 60
//!
//! # 모더레이터: 진행 중인 폴 조기 종료
//! overlay poll end -b brand-1 --id p-1
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::time::sleep;
use tracing::{info, warn};

use overlay_api::{Clock, OverlayApiClient, TimeSync};
use overlay_core::{
    init_logging, AppConfig, BrandId, LogConfig, LogFormat, OverlayError, OverlayResult,
    PollResults,
};
use overlay_notification::{attach_notification_feed, spawn_auto_dismiss, NotificationQueue};
use overlay_poll::{PollCoordinator, PollPhase};
use overlay_stream::{
    ClientEvent, ConnectionManager, EventKind, PollEndPayload, PollStartPayload, ServerEvent,
    StreamJoinedPayload,
};

#[derive(Parser)]
#[command(name = "overlay")]
#[command(about = "Stream overlay client - 라이브스트림 오버레이 이벤트 클라이언트", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로 (기본: config/default.toml, 없으면 내장 기본값)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 브랜드 스트림에 시청자로 참여해 오버레이 이벤트를 출력
    Watch {
        /// 브랜드 ID
        #[arg(short, long)]
        brand: String,

        /// 사용자명
        #[arg(short, long, default_value = "overlay-cli")]
        username: String,

        /// 프로필 이미지 URL
        #[arg(long)]
        profile_picture: Option<String>,
    },

    /// 모더레이터용 센티먼트 폴 제어
    Poll {
        #[command(subcommand)]
        action: PollAction,
    },
}

#[derive(Subcommand)]
enum PollAction {
    /// 새 센티먼트 폴 시작
    Start {
        /// 브랜드 ID
        #[arg(short, long)]
        brand: String,

        /// 폴 질문
        #[arg(short, long)]
        question: String,

        /// 진행 시간 (초)
        #[arg(long, default_value = "60")]
        duration_secs: u64,

        /// 투표 참여용 QR 코드 URL
        #[arg(long)]
        qr_code_url: Option<String>,
    },

    /// 진행 중인 폴 조기 종료
    End {
        /// 브랜드 ID
        #[arg(short, long)]
        brand: String,

        /// 폴 ID
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 지원 (없어도 무방)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let log_format = config
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();
    init_logging(LogConfig::new(&config.logging.level).with_format(log_format))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    match cli.command {
        Commands::Watch {
            brand,
            username,
            profile_picture,
        } => watch(config, BrandId::new(brand), username, profile_picture).await?,
        Commands::Poll { action } => moderate(config, action).await?,
    }

    Ok(())
}

/// 설정 파일 로드. 파일이 없으면 내장 기본값으로 동작합니다.
fn load_config(path: Option<&str>) -> AppConfig {
    let result = match path {
        Some(path) => AppConfig::load(path),
        None => AppConfig::load_default(),
    };

    match result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("설정 파일 로드 실패 ({}) - 기본값 사용", e);
            AppConfig::default()
        }
    }
}

/// 시청자 모드: 연결 + 부트스트랩 + 이벤트/틱 출력 루프.
async fn watch(
    config: AppConfig,
    brand: BrandId,
    username: String,
    profile_picture: Option<String>,
) -> OverlayResult<()> {
    // 의존성은 전역 상태 없이 명시적으로 생성해 주입한다
    let manager = Arc::new(ConnectionManager::new(config.stream.clone()));
    let api = OverlayApiClient::new(&config.api)?;
    let time_sync = Arc::new(TimeSync::new(&config.api)?);

    // 첫 동기화 라운드 - 실패해도 오프셋 0으로 계속 진행
    let offset = time_sync.sync().await;
    info!(offset_ms = offset, "시계 동기화 완료");
    let _resync = time_sync.spawn_resync(Duration::from_secs(config.api.time_sync_interval_secs));

    let coordinator = PollCoordinator::new(time_sync.clone() as Arc<dyn Clock>, &config.overlay);
    let _poll_subs = coordinator.attach(&manager);

    let queue = Arc::new(NotificationQueue::new());
    let _feed_subs =
        attach_notification_feed(&manager, brand.clone(), queue.clone(), &config.overlay);
    let _expiry = spawn_auto_dismiss(queue.clone());

    // 서버 에러 통지는 로그로만 표면화한다
    let _error_sub = manager.subscribe(
        EventKind::Error,
        Arc::new(|event| {
            if let ServerEvent::Error(payload) = event {
                warn!(message = %payload.message, "서버 에러 통지");
            }
        }),
    );

    manager.connect().await?;
    manager.join_stream(StreamJoinedPayload {
        brand_id: brand.clone(),
        username,
        profile_picture,
    });

    coordinator.bootstrap(&api, &brand).await;
    let _countdown = coordinator.spawn_countdown();

    let mut ticks = coordinator.subscribe_ticks();
    let mut active_rx = queue.watch_active();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(brand = %brand, "오버레이 감시 시작 (Ctrl+C로 종료)");

    loop {
        tokio::select! {
            tick = ticks.recv() => match tick {
                Ok(tick) => {
                    if tick.brand_id != brand {
                        continue;
                    }
                    match (&tick.poll, &tick.phase) {
                        (Some(poll), Some(PollPhase::Active)) => {
                            info!(
                                poll = %poll.id,
                                prompt = %poll.prompt,
                                seconds_left = tick.seconds_left.unwrap_or(0),
                                bull = %poll.results.bull_percent,
                                bear = %poll.results.bear_percent,
                                "폴 진행 중"
                            );
                        }
                        (Some(poll), Some(PollPhase::Closed { .. })) => {
                            info!(
                                poll = %poll.id,
                                bull = %poll.results.bull_percent,
                                bear = %poll.results.bear_percent,
                                "폴 종료 - 최종 결과"
                            );
                        }
                        _ => info!("표시 중인 폴 없음"),
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "틱 수신 지연 - 건너뜀");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            changed = active_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let active = active_rx.borrow_and_update().clone();
                if let Some(notification) = active {
                    info!(
                        username = %notification.username,
                        text = notification.text.as_deref().unwrap_or(""),
                        message = notification.custom_message.as_deref().unwrap_or(""),
                        "알림 표시"
                    );
                }
            }
            _ = &mut ctrl_c => {
                info!("종료 신호 수신");
                break;
            }
        }
    }

    manager.disconnect().await;
    Ok(())
}

/// 모더레이터 모드: 폴 제어 이벤트를 송신하고 종료합니다.
async fn moderate(config: AppConfig, action: PollAction) -> OverlayResult<()> {
    let manager = Arc::new(ConnectionManager::new(config.stream.clone()));
    let time_sync = Arc::new(TimeSync::new(&config.api)?);
    time_sync.sync().await;

    manager.connect().await?;
    wait_connected(&manager, Duration::from_secs(10)).await?;

    match action {
        PollAction::Start {
            brand,
            question,
            duration_secs,
            qr_code_url,
        } => {
            let id = uuid::Uuid::new_v4().to_string();
            let end_time_ms = time_sync.effective_now_ms() + duration_secs as i64 * 1_000;
            info!(poll = %id, end_time_ms, "센티먼트 폴 시작 전송");
            manager.emit(ClientEvent::StartSentimentPoll(PollStartPayload {
                id,
                brand_id: BrandId::new(brand),
                poll_question: question,
                end_time_ms,
                votes: 0,
                voters: 0,
                qr_code_url,
                position: None,
                results: PollResults::default(),
            }));
        }
        PollAction::End { brand, id } => {
            info!(poll = %id, "센티먼트 폴 종료 전송");
            manager.emit(ClientEvent::EndSentimentPoll(PollEndPayload {
                id,
                brand_id: BrandId::new(brand),
                votes: 0,
                voters: 0,
                results: PollResults::default(),
            }));
        }
    }

    // 송신 채널이 비워질 시간을 준 뒤 정리
    sleep(Duration::from_millis(200)).await;
    manager.disconnect().await;
    Ok(())
}

/// 연결 수립을 기다립니다.
async fn wait_connected(manager: &ConnectionManager, timeout: Duration) -> OverlayResult<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if manager.is_connected() {
            return Ok(());
        }
        sleep(Duration::from_millis(50)).await;
    }
    Err(OverlayError::Stream("스트림 서버 연결 타임아웃".to_string()))
}
