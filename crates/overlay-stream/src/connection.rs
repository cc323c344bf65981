//! 스트림 서버 연결 관리자.
//!
//! 프로세스당 하나의 지속 WebSocket 연결을 소유하고, 수신 이벤트를
//! 구독 레지스트리로 팬아웃하며, 연결이 끊기면 지수 백오프로 자동
//! 재연결합니다. 재연결에 성공할 때마다 참여 중인 룸을 다시 합류시켜
//! 단절 중에 이루어진 구독도 투명하게 복원됩니다.
//!
//! 전역 싱글턴이 아니라 명시적으로 생성해 `Arc`로 소비자에게 전달하는
//! 의존성 주입 구조입니다. `connect()`/`disconnect()`가 명시적
//! 라이프사이클입니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use overlay_core::StreamConfig;
//! use overlay_stream::{ConnectionManager, EventKind};
//!
//! let manager = Arc::new(ConnectionManager::new(StreamConfig::default()));
//!
//! let id = manager.subscribe(EventKind::TipReceived, Arc::new(|event| {
//!     println!("tip: {:?}", event);
//! }));
//!
//! manager.connect().await?;
//! // ... 사용 후 ...
//! manager.unsubscribe(id);
//! manager.disconnect().await;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use overlay_core::{BrandId, StreamConfig};

use crate::events::{ClientEvent, EventKind, ServerEvent, StreamJoinedPayload};
use crate::registry::{EventCallback, SubscriptionId, SubscriptionRegistry};
use crate::{StreamError, StreamResult};

/// 세션 종료 사유.
enum SessionEnd {
    /// 명시적 종료 요청
    Shutdown,
    /// 연결 유실 (재연결 대상)
    ConnectionLost,
}

/// 연결 태스크 종료 신호.
///
/// `Notify`만으로는 대기 중이 아닐 때의 신호가 유실되므로 플래그를
/// 함께 둡니다.
struct ShutdownToken {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if self.is_triggered() {
            return;
        }
        self.notify.notified().await;
    }
}

/// 스트림 서버와의 단일 지속 연결을 소유하는 관리자.
pub struct ConnectionManager {
    config: StreamConfig,
    registry: Arc<SubscriptionRegistry>,
    connected: Arc<AtomicBool>,
    rooms: Arc<Mutex<HashMap<BrandId, StreamJoinedPayload>>>,
    outbound_tx: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    shutdown: Mutex<Option<Arc<ShutdownToken>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// 새 연결 관리자를 생성합니다. 연결은 `connect()` 호출 전까지
    /// 수립되지 않습니다.
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            connected: Arc::new(AtomicBool::new(false)),
            rooms: Arc::new(Mutex::new(HashMap::new())),
            outbound_tx: Mutex::new(None),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// 연결 상태 확인.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 저수준 구독 레지스트리 접근.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// 연결 태스크를 시작합니다 (멱등).
    ///
    /// 이미 연결 태스크가 살아 있으면 아무것도 하지 않습니다 -
    /// `disconnect()` 없이 두 번 호출해도 연결은 하나만 존재합니다.
    pub async fn connect(&self) -> StreamResult<()> {
        // 락을 잡은 채 확인-후-생성해 connect 경쟁에서도 태스크가 하나만
        // 만들어지게 한다 (await 없음)
        let mut task = self.task.lock().expect("task lock poisoned");
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                debug!("이미 연결 태스크가 실행 중 - connect 무시");
                return Ok(());
            }
        }

        let (tx, rx) = mpsc::channel::<ClientEvent>(self.config.channel_capacity.max(1));
        let shutdown = Arc::new(ShutdownToken::new());

        *self.outbound_tx.lock().expect("outbound lock poisoned") = Some(tx);
        *self.shutdown.lock().expect("shutdown lock poisoned") = Some(shutdown.clone());

        *task = Some(tokio::spawn(run_loop(
            self.config.clone(),
            self.registry.clone(),
            self.connected.clone(),
            self.rooms.clone(),
            shutdown,
            rx,
        )));

        Ok(())
    }

    /// 연결을 종료하고 태스크를 정리합니다.
    pub async fn disconnect(&self) {
        let shutdown = self.shutdown.lock().expect("shutdown lock poisoned").take();
        if let Some(shutdown) = shutdown {
            shutdown.trigger();
        }

        let handle = self.task.lock().expect("task lock poisoned").take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("연결 태스크 종료 실패: {}", e);
            }
        }

        *self.outbound_tx.lock().expect("outbound lock poisoned") = None;
        self.connected.store(false, Ordering::SeqCst);
        info!("스트림 연결 해제됨");
    }

    /// 콜백을 등록합니다.
    ///
    /// 연결 전/단절 중에도 등록할 수 있으며, 연결이 수립되면 별도
    /// 조치 없이 이벤트를 받습니다.
    pub fn subscribe(&self, kind: EventKind, callback: EventCallback) -> SubscriptionId {
        self.registry.subscribe(kind, callback)
    }

    /// 콜백을 해제합니다.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// 브랜드 스트림 룸에 합류합니다.
    ///
    /// 합류 기록은 재연결 시마다 다시 전송됩니다.
    pub fn join_stream(&self, join: StreamJoinedPayload) {
        let brand = join.brand_id.clone();
        self.rooms
            .lock()
            .expect("rooms lock poisoned")
            .insert(brand.clone(), join.clone());

        if self.is_connected() {
            self.emit(ClientEvent::StreamJoined(join));
        } else {
            debug!(brand = %brand, "연결 전 룸 합류 기록 - 연결 시 전송");
        }
    }

    /// 브랜드 스트림 룸에서 이탈합니다 (재합류 대상에서 제거).
    pub fn leave_stream(&self, brand: &BrandId) {
        self.rooms
            .lock()
            .expect("rooms lock poisoned")
            .remove(brand);
    }

    /// 이벤트를 전송합니다 (at-most-once).
    ///
    /// 연결되지 않았으면 버퍼링/재시도 없이 로그만 남기고 폐기합니다 -
    /// 재연결 후 오래된 동작이 발사되는 것을 막습니다.
    pub fn emit(&self, event: ClientEvent) {
        if !self.is_connected() {
            warn!(event = event.wire_name(), "연결되지 않은 상태의 송신 - 폐기");
            return;
        }

        let guard = self.outbound_tx.lock().expect("outbound lock poisoned");
        match guard.as_ref() {
            Some(tx) => {
                if let Err(e) = tx.try_send(event) {
                    warn!("송신 채널 포화/종료 - 이벤트 폐기: {}", e);
                }
            }
            None => warn!("송신 채널 없음 - 이벤트 폐기"),
        }
    }
}

/// 재연결 루프.
///
/// 세션이 끊어지면 지수 백오프(+지터)로 재시도하고, 세션이 한 번이라도
/// 연결에 성공하면 백오프를 초기값으로 되돌립니다.
async fn run_loop(
    config: StreamConfig,
    registry: Arc<SubscriptionRegistry>,
    connected: Arc<AtomicBool>,
    rooms: Arc<Mutex<HashMap<BrandId, StreamJoinedPayload>>>,
    shutdown: Arc<ShutdownToken>,
    mut outbound_rx: mpsc::Receiver<ClientEvent>,
) {
    let initial = Duration::from_millis(config.backoff_initial_ms.max(1));
    let max = Duration::from_millis(config.backoff_max_ms.max(config.backoff_initial_ms));
    let mut backoff = initial;

    loop {
        if shutdown.is_triggered() {
            break;
        }

        match run_session(
            &config,
            &registry,
            &connected,
            &rooms,
            &shutdown,
            &mut outbound_rx,
        )
        .await
        {
            Ok(SessionEnd::Shutdown) => {
                connected.store(false, Ordering::SeqCst);
                break;
            }
            Ok(SessionEnd::ConnectionLost) => {
                // 연결까지는 성공했던 세션 - 백오프 초기화
                backoff = initial;
            }
            Err(e) => {
                warn!("스트림 연결 실패: {}", e);
            }
        }

        connected.store(false, Ordering::SeqCst);

        let jitter = rand::thread_rng().gen_range(0..=(backoff.as_millis() as u64 / 4));
        let wait = backoff + Duration::from_millis(jitter);
        debug!(wait_ms = wait.as_millis() as u64, "재연결 대기");
        tokio::select! {
            _ = sleep(wait) => {}
            _ = shutdown.wait() => break,
        }
        backoff = next_backoff(backoff, max);
    }

    connected.store(false, Ordering::SeqCst);
    info!("스트림 연결 루프 종료");
}

/// 단일 연결 세션.
async fn run_session(
    config: &StreamConfig,
    registry: &SubscriptionRegistry,
    connected: &AtomicBool,
    rooms: &Mutex<HashMap<BrandId, StreamJoinedPayload>>,
    shutdown: &ShutdownToken,
    outbound_rx: &mut mpsc::Receiver<ClientEvent>,
) -> StreamResult<SessionEnd> {
    info!("스트림 서버 연결 중: {}", config.url);

    let connect_timeout = Duration::from_secs(config.connect_timeout_secs.max(1));
    let (ws, _response) = match timeout(connect_timeout, connect_async(&config.url)).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => return Err(StreamError::Connect(e.to_string())),
        Err(_) => {
            return Err(StreamError::Timeout(format!(
                "connect > {}s",
                config.connect_timeout_secs
            )))
        }
    };

    let (mut write, mut read) = ws.split();
    connected.store(true, Ordering::SeqCst);
    info!("스트림 서버 연결됨");

    // 단절 중 채널에 남은 송신 이벤트는 오래된 동작이므로 폐기
    let mut stale = 0usize;
    while outbound_rx.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        warn!(count = stale, "재연결 전에 쌓인 송신 이벤트 폐기");
    }

    // 참여 중인 룸 재합류 - 단절 중 생긴 구독도 이것으로 복원됨
    let joins: Vec<StreamJoinedPayload> = rooms
        .lock()
        .expect("rooms lock poisoned")
        .values()
        .cloned()
        .collect();
    for join in joins {
        let brand = join.brand_id.clone();
        let json = serde_json::to_string(&ClientEvent::StreamJoined(join))?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| StreamError::WebSocket(e.to_string()))?;
        debug!(brand = %brand, "스트림 룸 합류 전송");
    }

    let mut ping = interval(Duration::from_secs(config.ping_interval_secs.max(1)));
    ping.tick().await; // 첫 틱은 즉시 발화하므로 소비

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    dispatch_text(registry, &text);
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    warn!("서버가 연결을 종료함");
                    return Ok(SessionEnd::ConnectionLost);
                }
                Some(Err(e)) => {
                    error!("WebSocket 수신 에러: {}", e);
                    return Ok(SessionEnd::ConnectionLost);
                }
                None => {
                    warn!("WebSocket 스트림 종료");
                    return Ok(SessionEnd::ConnectionLost);
                }
                _ => {}
            },
            maybe = outbound_rx.recv() => match maybe {
                Some(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("송신 이벤트 직렬화 실패: {}", e);
                            continue;
                        }
                    };
                    debug!(event = event.wire_name(), "이벤트 송신");
                    if let Err(e) = write.send(Message::Text(json)).await {
                        error!("송신 실패: {}", e);
                        return Ok(SessionEnd::ConnectionLost);
                    }
                }
                None => return Ok(SessionEnd::ConnectionLost),
            },
            _ = ping.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    error!("Ping 전송 실패: {}", e);
                    return Ok(SessionEnd::ConnectionLost);
                }
                debug!("Ping 전송");
            }
            _ = shutdown.wait() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Shutdown);
            }
        }
    }
}

/// 수신 텍스트 프레임 하나를 파싱해 팬아웃합니다.
///
/// 비정형/알 수 없는 이벤트는 버리고 계속 진행합니다 - 어떤 수신
/// 프레임도 오버레이를 중단시키지 않습니다.
fn dispatch_text(registry: &SubscriptionRegistry, text: &str) {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => {
            let dispatched = registry.dispatch(&event);
            debug!(event = %event.kind(), callbacks = dispatched, "이벤트 디스패치");
        }
        Err(e) => {
            warn!("수신 이벤트 파싱 실패 - 폐기: {}", e);
        }
    }
}

/// 다음 백오프 간격: 2배 증가, 상한에서 고정.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}
