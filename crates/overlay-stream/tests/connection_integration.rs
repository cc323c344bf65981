//! ConnectionManager 통합 테스트.
//!
//! 실제 서버 대신 로컬 루프백에 띄운 WebSocket 서버로 연결/팬아웃/
//! 재연결 동작을 검증합니다.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;

use overlay_core::{BrandId, StreamConfig};
use overlay_stream::{ClientEvent, ConnectionManager, EventKind, StreamJoinedPayload};

/// 테스트용 인프로세스 스트림 서버.
struct TestServer {
    addr: SocketAddr,
    /// 접속 중인 모든 클라이언트로 브로드캐스트
    outbound: broadcast::Sender<String>,
    /// 현재 연결을 서버 쪽에서 강제 종료
    kick: broadcast::Sender<()>,
    /// 클라이언트가 보낸 텍스트 프레임
    received: Arc<Mutex<Vec<String>>>,
    /// 누적 연결 수
    connections: Arc<AtomicUsize>,
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (outbound, _) = broadcast::channel::<String>(64);
        let (kick, _) = broadcast::channel::<()>(8);
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let outbound_accept = outbound.clone();
        let kick_accept = kick.clone();
        let received_accept = received.clone();
        let connections_accept = connections.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                connections_accept.fetch_add(1, Ordering::SeqCst);

                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => continue,
                };

                let mut out_rx = outbound_accept.subscribe();
                let mut kick_rx = kick_accept.subscribe();
                let received = received_accept.clone();

                tokio::spawn(async move {
                    let (mut write, mut read) = ws.split();
                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    received.lock().unwrap().push(text.to_string());
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    let _ = write.send(Message::Pong(data)).await;
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            res = out_rx.recv() => match res {
                                Ok(text) => {
                                    if write.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            },
                            _ = kick_rx.recv() => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            outbound,
            kick,
            received,
            connections,
        }
    }

    fn config(&self) -> StreamConfig {
        StreamConfig {
            url: format!("ws://{}", self.addr),
            connect_timeout_secs: 2,
            backoff_initial_ms: 50,
            backoff_max_ms: 200,
            ping_interval_secs: 30,
            channel_capacity: 16,
        }
    }

    fn send(&self, text: &str) {
        let _ = self.outbound.send(text.to_string());
    }

    fn kick_clients(&self) {
        let _ = self.kick.send(());
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

/// 조건이 참이 될 때까지 폴링합니다.
async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn tip_json(brand: &str, username: &str) -> String {
    format!(
        r#"{{"event":"tip_received","data":{{"brandId":"{}","username":"{}","amount":"1.5","token":"SOL"}}}}"#,
        brand, username
    )
}

#[tokio::test]
async fn fan_out_dispatches_to_every_callback() {
    let server = TestServer::spawn().await;
    let manager = Arc::new(ConnectionManager::new(server.config()));

    let hits = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let hits = hits.clone();
        manager.subscribe(
            EventKind::TipReceived,
            Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    manager.connect().await.unwrap();
    assert!(
        wait_until(|| manager.is_connected(), Duration::from_secs(2)).await,
        "연결 수립 실패"
    );

    server.send(&tip_json("brand-1", "alice"));
    assert!(
        wait_until(|| hits.load(Ordering::SeqCst) == 3, Duration::from_secs(2)).await,
        "메시지 1건은 콜백 3개 모두에 전달되어야 함: {}",
        hits.load(Ordering::SeqCst)
    );

    // 메시지 1건당 콜백당 정확히 1회
    server.send(&tip_json("brand-1", "bob"));
    assert!(wait_until(|| hits.load(Ordering::SeqCst) == 6, Duration::from_secs(2)).await);

    manager.disconnect().await;
}

#[tokio::test]
async fn unsubscribed_callback_receives_nothing() {
    let server = TestServer::spawn().await;
    let manager = Arc::new(ConnectionManager::new(server.config()));

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_cb = hits.clone();
    let id = manager.subscribe(
        EventKind::TipReceived,
        Arc::new(move |_| {
            hits_cb.fetch_add(1, Ordering::SeqCst);
        }),
    );

    manager.connect().await.unwrap();
    assert!(wait_until(|| manager.is_connected(), Duration::from_secs(2)).await);

    assert!(manager.unsubscribe(id));
    assert!(!manager.registry().has_subscribers(EventKind::TipReceived));

    server.send(&tip_json("brand-1", "alice"));
    sleep(Duration::from_millis(200)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn reconnect_reattaches_subscriptions_and_rooms() {
    let server = TestServer::spawn().await;
    let manager = Arc::new(ConnectionManager::new(server.config()));

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_cb = hits.clone();
    manager.subscribe(
        EventKind::TipReceived,
        Arc::new(move |_| {
            hits_cb.fetch_add(1, Ordering::SeqCst);
        }),
    );

    // 연결 전에 합류해도 연결 시 전송된다
    manager.join_stream(StreamJoinedPayload {
        brand_id: BrandId::new("brand-1"),
        username: "viewer-1".to_string(),
        profile_picture: None,
    });

    manager.connect().await.unwrap();
    assert!(wait_until(|| manager.is_connected(), Duration::from_secs(2)).await);
    assert!(
        wait_until(
            || server
                .received()
                .iter()
                .filter(|text| text.contains("stream_joined"))
                .count()
                == 1,
            Duration::from_secs(2)
        )
        .await
    );

    // 서버가 연결을 끊으면 자동 재연결 후 룸을 재합류한다
    server.kick_clients();
    assert!(
        wait_until(
            || server.connections.load(Ordering::SeqCst) >= 2,
            Duration::from_secs(3)
        )
        .await,
        "재연결이 일어나야 함"
    );
    assert!(
        wait_until(
            || server
                .received()
                .iter()
                .filter(|text| text.contains("stream_joined"))
                .count()
                >= 2,
            Duration::from_secs(3)
        )
        .await,
        "재연결 시 룸 재합류가 전송되어야 함"
    );

    // 재연결 후에도 기존 구독이 이벤트를 받는다
    assert!(wait_until(|| manager.is_connected(), Duration::from_secs(2)).await);
    server.send(&tip_json("brand-1", "carol"));
    assert!(
        wait_until(|| hits.load(Ordering::SeqCst) >= 1, Duration::from_secs(2)).await,
        "재연결 후 메시지가 콜백에 도달해야 함"
    );

    manager.disconnect().await;
}

#[tokio::test]
async fn connect_is_idempotent() {
    let server = TestServer::spawn().await;
    let manager = Arc::new(ConnectionManager::new(server.config()));

    manager.connect().await.unwrap();
    assert!(wait_until(|| manager.is_connected(), Duration::from_secs(2)).await);
    manager.connect().await.unwrap();

    sleep(Duration::from_millis(300)).await;
    assert_eq!(
        server.connections.load(Ordering::SeqCst),
        1,
        "disconnect 없는 중복 connect는 연결을 하나만 유지해야 함"
    );

    manager.disconnect().await;
}

#[tokio::test]
async fn emit_while_disconnected_drops_event() {
    let server = TestServer::spawn().await;
    let manager = Arc::new(ConnectionManager::new(server.config()));

    // 연결 없이 송신 - 로그 후 폐기, 패닉/큐잉 없음
    manager.emit(ClientEvent::StreamJoined(StreamJoinedPayload {
        brand_id: BrandId::new("brand-1"),
        username: "ghost".to_string(),
        profile_picture: None,
    }));

    manager.connect().await.unwrap();
    assert!(wait_until(|| manager.is_connected(), Duration::from_secs(2)).await);
    sleep(Duration::from_millis(200)).await;

    // 단절 중 송신분이 연결 후 뒤늦게 도착하면 안 된다
    assert!(
        server.received().is_empty(),
        "단절 중 emit은 재연결 후에도 전송되지 않아야 함: {:?}",
        server.received()
    );

    manager.disconnect().await;
}

#[tokio::test]
async fn malformed_frame_does_not_break_dispatch() {
    let server = TestServer::spawn().await;
    let manager = Arc::new(ConnectionManager::new(server.config()));

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_cb = hits.clone();
    manager.subscribe(
        EventKind::TipReceived,
        Arc::new(move |_| {
            hits_cb.fetch_add(1, Ordering::SeqCst);
        }),
    );

    manager.connect().await.unwrap();
    assert!(wait_until(|| manager.is_connected(), Duration::from_secs(2)).await);

    server.send("this is not json");
    server.send(r#"{"event":"unknown_kind","data":{}}"#);
    server.send(&tip_json("brand-1", "alice"));

    assert!(
        wait_until(|| hits.load(Ordering::SeqCst) == 1, Duration::from_secs(2)).await,
        "비정형 프레임 이후에도 정상 이벤트는 전달되어야 함"
    );
    assert!(manager.is_connected());

    manager.disconnect().await;
}
