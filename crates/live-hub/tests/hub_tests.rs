//! Hub behavior over real sockets, driven by a raw WebSocket client.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use live_hub::{Hub, HubConfig};
use live_protocol::{Notification, NotificationLevel, TaskUpdate};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_hub(config: HubConfig) -> Hub {
    Hub::start(HubConfig { port: 0, ..config }).await.unwrap()
}

async fn open(port: u16, token: &str) -> Ws {
    let url = format!("ws://127.0.0.1:{port}/ws/connect?token={token}");
    let (ws, _) = connect_async(url.as_str()).await.unwrap();
    ws
}

/// Open a connection and consume the `connected` ack.
async fn open_acked(port: u16, token: &str) -> (Ws, Value) {
    let mut ws = open(port, token).await;
    let ack = recv_json(&mut ws).await;
    assert_eq!(ack["type"], "connected");
    (ws, ack)
}

async fn recv_json(ws: &mut Ws) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame");
        match msg {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// The close code of the next frame, which must be a close frame.
async fn close_code(ws: &mut Ws) -> u16 {
    let msg = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for close");
    match msg {
        Some(Ok(Message::Close(Some(frame)))) => u16::from(frame.code),
        other => panic!("expected a close frame, got {other:?}"),
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met within 5s");
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn accepted_client_gets_connected_ack() {
    let hub = start_hub(HubConfig::default()).await;
    let (_ws, ack) = open_acked(hub.port(), "abc").await;

    assert!(ack["data"]["client_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(ack["data"]["message"].is_string());
    assert_eq!(hub.client_count(), 1);
}

#[tokio::test]
async fn wrong_token_is_closed_with_policy_violation() {
    let hub = start_hub(HubConfig {
        token: Some("abc".into()),
        ..HubConfig::default()
    })
    .await;

    let mut ws = open(hub.port(), "nope").await;
    assert_eq!(close_code(&mut ws).await, 1008);

    let (_ws, _) = open_acked(hub.port(), "abc").await;
}

#[tokio::test]
async fn missing_token_is_closed_with_policy_violation() {
    let hub = start_hub(HubConfig::default()).await;
    let url = format!("ws://127.0.0.1:{}/ws/connect", hub.port());
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    assert_eq!(close_code(&mut ws).await, 1008);

    let mut ws = open(hub.port(), "").await;
    assert_eq!(close_code(&mut ws).await, 1008);
}

#[tokio::test]
async fn connections_over_limit_are_refused() {
    let hub = start_hub(HubConfig {
        max_connections: Some(1),
        ..HubConfig::default()
    })
    .await;
    let (_first, _) = open_acked(hub.port(), "abc").await;

    let url = format!("ws://127.0.0.1:{}/ws/connect?token=abc", hub.port());
    match connect_async(url.as_str()).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 503);
        }
        Err(e) => panic!("expected 503, got {e}"),
        Ok(_) => panic!("expected 503, connection was accepted"),
    }
}

#[tokio::test]
async fn health_reports_clients() {
    let hub = start_hub(HubConfig::default()).await;
    let (_ws, _) = open_acked(hub.port(), "abc").await;

    let url = format!("http://127.0.0.1:{}/health", hub.port());
    let resp = reqwest::get(&url).await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clients"], 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Client frames
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_then_receive_task_updates() {
    let hub = start_hub(HubConfig::default()).await;
    let (mut ws, _) = open_acked(hub.port(), "abc").await;

    send_json(&mut ws, json!({"type": "subscribe_task", "data": {"task_id": 42}})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"type": "subscribed", "data": {"task_id": 42}})
    );
    assert_eq!(hub.subscriber_count(42), 1);

    assert_eq!(hub.publish_task_update(&TaskUpdate::new(43, 10.0)), 0);
    assert_eq!(hub.publish_task_update(&TaskUpdate::new(42, 50.0).with_status("running")), 1);

    let update = recv_json(&mut ws).await;
    assert_eq!(update["type"], "task_update");
    assert_eq!(update["task_id"], 42);
    assert_eq!(update["data"]["task_id"], 42);
    assert_eq!(update["data"]["progress"], 50.0);
    assert_eq!(update["data"]["status"], "running");
}

#[tokio::test]
async fn task_id_at_top_level_is_accepted() {
    let hub = start_hub(HubConfig::default()).await;
    let (mut ws, _) = open_acked(hub.port(), "abc").await;

    send_json(&mut ws, json!({"type": "subscribe_task", "task_id": 7})).await;
    assert_eq!(recv_json(&mut ws).await["data"]["task_id"], 7);
    assert_eq!(hub.subscriber_count(7), 1);
}

#[tokio::test]
async fn unsubscribe_stops_updates() {
    let hub = start_hub(HubConfig::default()).await;
    let (mut ws, _) = open_acked(hub.port(), "abc").await;

    send_json(&mut ws, json!({"type": "subscribe_task", "data": {"task_id": 1}})).await;
    recv_json(&mut ws).await;
    send_json(&mut ws, json!({"type": "unsubscribe_task", "data": {"task_id": 1}})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"type": "unsubscribed", "data": {"task_id": 1}})
    );

    assert_eq!(hub.subscriber_count(1), 0);
    assert_eq!(hub.publish_task_update(&TaskUpdate::new(1, 100.0)), 0);
}

#[tokio::test]
async fn ping_gets_pong() {
    let hub = start_hub(HubConfig::default()).await;
    let (mut ws, _) = open_acked(hub.port(), "abc").await;

    send_json(&mut ws, json!({"type": "ping", "data": null})).await;
    assert_eq!(recv_json(&mut ws).await, json!({"type": "pong", "data": null}));
}

#[tokio::test]
async fn bad_frames_get_error_and_keep_connection() {
    let hub = start_hub(HubConfig::default()).await;
    let (mut ws, _) = open_acked(hub.port(), "abc").await;

    ws.send(Message::Text("{not json".to_string().into())).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["data"]["message"].is_string());

    send_json(&mut ws, json!({"type": "launch_rockets", "data": {}})).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["data"]["message"].as_str().unwrap().contains("launch_rockets"));

    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

// ─────────────────────────────────────────────────────────────────────────────
// Server pushes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn notify_reaches_every_client() {
    let hub = start_hub(HubConfig::default()).await;
    let (mut a, _) = open_acked(hub.port(), "abc").await;
    let (mut b, _) = open_acked(hub.port(), "def").await;

    let sent = hub.notify(&Notification::new("Maintenance at noon", NotificationLevel::Warning));
    assert_eq!(sent, 2);

    for ws in [&mut a, &mut b] {
        assert_eq!(
            recv_json(ws).await,
            json!({"type": "notification", "data": {"message": "Maintenance at noon", "level": "warning"}})
        );
    }
}

#[tokio::test]
async fn disconnect_all_closes_sockets() {
    let hub = start_hub(HubConfig::default()).await;
    let (mut ws, _) = open_acked(hub.port(), "abc").await;

    assert_eq!(hub.disconnect_all(), 1);
    assert_eq!(close_code(&mut ws).await, 1000);
    eventually(|| hub.client_count() == 0).await;
}

#[tokio::test]
async fn closing_client_drops_its_subscriptions() {
    let hub = start_hub(HubConfig::default()).await;
    let (mut ws, _) = open_acked(hub.port(), "abc").await;

    send_json(&mut ws, json!({"type": "subscribe_task", "data": {"task_id": 5}})).await;
    recv_json(&mut ws).await;
    assert_eq!(hub.subscriber_count(5), 1);

    ws.close(None).await.unwrap();
    eventually(|| hub.subscriber_count(5) == 0 && hub.client_count() == 0).await;
}

#[tokio::test]
async fn stop_shuts_down_the_hub() {
    let mut hub = start_hub(HubConfig::default()).await;
    let port = hub.port();
    let (mut ws, _) = open_acked(port, "abc").await;

    hub.stop().await;
    assert_eq!(close_code(&mut ws).await, 1000);

    let url = format!("ws://127.0.0.1:{port}/ws/connect?token=abc");
    assert!(connect_async(url.as_str()).await.is_err());
}
