//! End-to-end tests against a real listener, using `tokio-tungstenite`
//! subscribers and a `reqwest` publisher.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use relay_core::handlers::Silent;
use relay_server::{HubConfig, HubServer};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn test_config() -> HubConfig {
    let mut config = HubConfig::default();
    config.publish_limit.interval_ms = 1;
    config.publish_limit.burst = 64;
    config
}

/// Boot a server on a free port.
async fn boot_server(config: HubConfig) -> (SocketAddr, Arc<HubServer>) {
    let server = Arc::new(HubServer::new(config, Arc::new(Silent)));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn subscribe(addr: SocketAddr) -> WsStream {
    let (ws, _) = timeout(TIMEOUT, connect_async(format!("ws://{addr}/subscribe")))
        .await
        .unwrap()
        .unwrap();
    ws
}

async fn publish(addr: SocketAddr, body: impl Into<reqwest::Body>) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(format!("http://{addr}/publish"))
        .body(body)
        .send()
        .await
        .unwrap()
        .status()
}

/// Next data or close frame, skipping pings and pongs.
async fn next_message(ws: &mut WsStream) -> Message {
    loop {
        let msg = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        if !matches!(msg, Message::Ping(_) | Message::Pong(_)) {
            return msg;
        }
    }
}

async fn next_text(ws: &mut WsStream) -> String {
    match next_message(ws).await {
        Message::Text(text) => text.as_str().to_owned(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn next_close_code(ws: &mut WsStream) -> CloseCode {
    match next_message(ws).await {
        Message::Close(Some(frame)) => frame.code,
        other => panic!("expected close frame, got {other:?}"),
    }
}

async fn wait_for_subscribers(server: &HubServer, count: usize) {
    timeout(TIMEOUT, async {
        while server.hub().registry().len() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {count} subscribers, found {}",
            server.hub().registry().len()
        )
    });
}

#[tokio::test]
async fn http_publish_reaches_every_subscriber() {
    let (addr, server) = boot_server(test_config()).await;
    let mut a = subscribe(addr).await;
    let mut b = subscribe(addr).await;
    wait_for_subscribers(&server, 2).await;

    assert_eq!(publish(addr, "hello").await, reqwest::StatusCode::ACCEPTED);
    assert_eq!(next_text(&mut a).await, "hello");
    assert_eq!(next_text(&mut b).await, "hello");
}

#[tokio::test]
async fn http_publish_size_limits() {
    let (addr, _server) = boot_server(test_config()).await;
    assert_eq!(
        publish(addr, vec![b'x'; 9000]).await,
        reqwest::StatusCode::PAYLOAD_TOO_LARGE
    );
    assert_eq!(
        publish(addr, vec![b'x'; 100]).await,
        reqwest::StatusCode::ACCEPTED
    );
}

#[tokio::test]
async fn http_publish_rejects_get() {
    let (addr, _server) = boot_server(test_config()).await;
    let status = reqwest::get(format!("http://{addr}/publish"))
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn non_utf8_payload_arrives_as_binary() {
    let (addr, server) = boot_server(test_config()).await;
    let mut ws = subscribe(addr).await;
    wait_for_subscribers(&server, 1).await;

    assert_eq!(
        publish(addr, vec![0xff, 0x00, 0xfe]).await,
        reqwest::StatusCode::ACCEPTED
    );
    match next_message(&mut ws).await {
        Message::Binary(data) => assert_eq!(data.as_ref(), [0xff, 0x00, 0xfe]),
        other => panic!("expected binary frame, got {other:?}"),
    }
}

#[tokio::test]
async fn frame_from_one_subscriber_reaches_all() {
    let (addr, server) = boot_server(test_config()).await;
    let mut sender = subscribe(addr).await;
    let mut listener = subscribe(addr).await;
    wait_for_subscribers(&server, 2).await;

    sender
        .send(Message::Text("guess 7".into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut listener).await, "guess 7");
    assert_eq!(next_text(&mut sender).await, "guess 7");
}

#[tokio::test]
async fn messages_arrive_in_publish_order() {
    let (addr, server) = boot_server(test_config()).await;
    let mut ws = subscribe(addr).await;
    wait_for_subscribers(&server, 1).await;

    for i in 0..10 {
        assert_eq!(
            publish(addr, format!("m{i}")).await,
            reqwest::StatusCode::ACCEPTED
        );
    }
    for i in 0..10 {
        assert_eq!(next_text(&mut ws).await, format!("m{i}"));
    }
}

#[tokio::test]
async fn client_close_leaves_registry() {
    let (addr, server) = boot_server(test_config()).await;
    let mut ws = subscribe(addr).await;
    let _other = subscribe(addr).await;
    wait_for_subscribers(&server, 2).await;

    ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "done".into(),
    }))
    .await
    .unwrap();
    wait_for_subscribers(&server, 1).await;
}

#[tokio::test]
async fn dropped_connection_leaves_registry() {
    let (addr, server) = boot_server(test_config()).await;
    let ws = subscribe(addr).await;
    wait_for_subscribers(&server, 1).await;

    drop(ws);
    wait_for_subscribers(&server, 0).await;
}

#[tokio::test]
async fn session_past_lifetime_closes_normally() {
    let mut config = test_config();
    config.max_session_secs = 1;
    let (addr, server) = boot_server(config).await;
    let mut ws = subscribe(addr).await;
    wait_for_subscribers(&server, 1).await;

    assert_eq!(next_close_code(&mut ws).await, CloseCode::Normal);
    wait_for_subscribers(&server, 0).await;
}

#[tokio::test]
async fn shutdown_closes_sessions_going_away() {
    let (addr, server) = boot_server(test_config()).await;
    let mut ws = subscribe(addr).await;
    wait_for_subscribers(&server, 1).await;

    server.shutdown().shutdown();
    assert_eq!(next_close_code(&mut ws).await, CloseCode::Away);
    wait_for_subscribers(&server, 0).await;
}

#[tokio::test]
async fn health_counts_live_subscribers() {
    let (addr, server) = boot_server(test_config()).await;
    let _a = subscribe(addr).await;
    let _b = subscribe(addr).await;
    wait_for_subscribers(&server, 2).await;

    let json: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["subscribers"], 2);
}
