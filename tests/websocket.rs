mod support;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use support::{roster, HelloHiGenerator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tournament_arena::prelude::*;

fn config() -> Configuration {
    Configuration::new()
        .with_phase_durations(
            Duration::from_millis(300),
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .with_tick_interval(Duration::from_millis(100))
        .with_scheduler_cadence(Duration::from_millis(100))
}

async fn serve() -> (Arc<Arena>, String, tokio::task::JoinHandle<anyhow::Result<()>>) {
    let arena = Arc::new(
        Arena::new(
            &roster(2),
            Arc::new(HelloHiGenerator {
                latency: Duration::ZERO,
            }),
            config(),
        )
        .unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    arena.start().unwrap();

    let server = arena.clone();
    let handle = tokio::spawn(async move { server.serve_on(listener).await });
    (arena, addr, handle)
}

#[tokio::test]
async fn test_websocket_viewer_receives_init_then_updates() {
    let (arena, addr, server) = serve().await;
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let mut mirror = ViewerMirror::new();
    let mut frames = 0;
    let received = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(msg) = socket.next().await {
            let msg = msg.unwrap();
            if !msg.is_text() {
                continue;
            }
            let frame: Frame = serde_json::from_str(msg.to_text().unwrap()).unwrap();
            if frames == 0 {
                assert_eq!(frame.kind, FrameKind::Init);
            }
            frames += 1;
            mirror.apply(frame).unwrap();
            if mirror
                .game_state()
                .is_some_and(|state| !state.active_interactions.is_empty())
            {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(received, Ok(true));

    let interaction = &mirror.game_state().unwrap().active_interactions[0];
    assert_eq!(interaction.messages[0].text, "Hello");
    assert_eq!(interaction.messages[1].text, "Hi");
    assert_eq!(arena.hub().viewer_count(), 1);

    arena.shutdown().await;
    // the hub closes the connection on shutdown
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = socket.next().await {
            if matches!(msg, WsMessage::Close(_)) {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(server.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_health_endpoint() {
    let (arena, addr, server) = serve().await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = &response[response.find("\r\n\r\n").unwrap() + 4..];
    let health: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["agents"], 2);
    assert!(health["version"].is_u64());

    arena.shutdown().await;
    assert!(server.await.unwrap().is_ok());
}
