//! WebSocket connector against a plain tungstenite server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use live_transport::{Connector, WebSocketConnector, channel_url};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Accept one client and write `frames` to it, then close.
async fn serve_frames(frames: Vec<Message>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(frame).await.unwrap();
        }
        let _ = ws.close(None).await;
    });
    port
}

async fn received(port: u16) -> Vec<String> {
    let url = channel_url(&format!("ws://127.0.0.1:{port}/ws/connect"), "abc").unwrap();
    let connection = WebSocketConnector::new().connect(&url).await.unwrap();
    timeout(Duration::from_secs(5), connection.stream.map(|frame| frame.unwrap()).collect())
        .await
        .expect("timed out reading frames")
}

#[tokio::test]
async fn binary_frames_that_are_not_utf8_are_dropped() {
    let invalid = b"{\"type\":\"task_update\",\"data\":{\"task_id\":1,\"current_item\":\"x\xff\"}}".to_vec();
    let valid = r#"{"type":"task_update","data":{"task_id":2,"progress":10.0}}"#;

    let port = serve_frames(vec![
        Message::Binary(invalid.into()),
        Message::Text(valid.to_string().into()),
    ])
    .await;

    assert_eq!(received(port).await, vec![valid.to_string()]);
}

#[tokio::test]
async fn utf8_binary_frames_are_read_as_text() {
    let frame = r#"{"type":"pong","data":null}"#;
    let port = serve_frames(vec![Message::Binary(frame.as_bytes().to_vec().into())]).await;

    assert_eq!(received(port).await, vec![frame.to_string()]);
}
