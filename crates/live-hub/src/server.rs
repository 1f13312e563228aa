//! WebSocket hub server using Axum.
//!
//! Handles the token check on upgrade, the `connected` acknowledgement,
//! client frames (subscriptions and pings), and pushes from the host
//! application to connected clients.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use live_protocol::auth::{CHANNEL_PATH, CLOSE_POLICY_VIOLATION};
use live_protocol::{
    ClientMessage, ConnectedAck, Envelope, MessageTypes, Notification, ServerError, ServerMessage,
    TaskId, TaskSubscription, TaskUpdate,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::client::{ClientConnection, Outbound};
use crate::error::HubError;

/// Hub server configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Accepted credential. `None` accepts any non-empty token.
    pub token: Option<String>,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Enable permissive CORS
    pub enable_cors: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            hostname: "127.0.0.1".into(),
            token: None,
            max_connections: Some(64),
            enable_cors: false,
        }
    }
}

/// Shared state for the hub server.
struct HubState {
    config: HubConfig,
    clients: DashMap<String, ClientConnection>,
}

/// The hub: accepts channel clients and pushes updates to them.
pub struct Hub {
    state: Arc<HubState>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl Hub {
    /// Bind and start serving in the background.
    pub async fn start(config: HubConfig) -> Result<Self, HubError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let address = format!("{}:{}", config.hostname, config.port);
        let addr: SocketAddr = address
            .parse()
            .map_err(|source| HubError::InvalidAddress { address, source })?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        let state = Arc::new(HubState {
            config: config.clone(),
            clients: DashMap::new(),
        });

        let mut app = Router::new()
            .route(CHANNEL_PATH, get(ws_upgrade_handler))
            .route("/health", get(health_handler))
            .with_state(state.clone());
        if config.enable_cors {
            app = app.layer(CorsLayer::permissive());
        }

        info!("Live hub listening on ws://{}:{}{CHANNEL_PATH}", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client_count(&self) -> usize {
        self.state.clients.len()
    }

    /// Number of clients subscribed to `task_id`.
    pub fn subscriber_count(&self, task_id: TaskId) -> usize {
        self.state
            .clients
            .iter()
            .filter(|client| client.is_subscribed(task_id))
            .count()
    }

    /// Push a `task_update` to every subscriber of the task. Returns the
    /// number of clients it was queued for.
    ///
    /// The task id is repeated at the top level of the frame, next to
    /// `data`; clients fold it into the payload.
    pub fn publish_task_update(&self, update: &TaskUpdate) -> usize {
        let data = match serde_json::to_value(update) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to encode task update {}: {e}", update.task_id);
                return 0;
            }
        };
        let frame = json!({
            "type": MessageTypes::TASK_UPDATE,
            "task_id": update.task_id,
            "data": data,
        })
        .to_string();

        let delivered = self
            .state
            .clients
            .iter()
            .filter(|client| client.is_subscribed(update.task_id))
            .filter(|client| client.send(frame.clone()))
            .count();
        debug!("Task {} update queued for {delivered} client(s)", update.task_id);
        delivered
    }

    /// Push a `notification` to every connected client.
    pub fn notify(&self, notification: &Notification) -> usize {
        let frame = match ServerMessage::Notification(notification.clone()).encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode notification: {e}");
                return 0;
            }
        };
        self.state
            .clients
            .iter()
            .filter(|client| client.send(frame.clone()))
            .count()
    }

    /// Close every client socket. Clients see a normal close.
    pub fn disconnect_all(&self) -> usize {
        let closed = self.state.clients.iter().filter(|client| client.close()).count();
        info!("Closing {closed} client connection(s)");
        closed
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        self.disconnect_all();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Live hub stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    if let Some(max) = state.config.max_connections {
        let current = state.clients.len();
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    if let Err(reason) = check_token(&state.config, params.token.as_deref()) {
        warn!("Connection rejected: {reason}");
        return ws.on_upgrade(move |socket| reject(socket, reason)).into_response();
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.clients.len(),
    }))
}

fn check_token(config: &HubConfig, token: Option<&str>) -> Result<(), &'static str> {
    let token = token.map(str::trim).unwrap_or_default();
    if token.is_empty() {
        return Err("missing token");
    }
    match &config.token {
        Some(expected) if expected != token => Err("invalid token"),
        _ => Ok(()),
    }
}

/// Complete the upgrade only to close with a policy violation.
async fn reject(mut socket: WebSocket, reason: &'static str) {
    let frame = CloseFrame {
        code: CLOSE_POLICY_VIOLATION,
        reason: reason.to_string().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Failed to send policy close: {e}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection(socket: WebSocket, state: Arc<HubState>) {
    let client_id = uuid::Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    state
        .clients
        .insert(client_id.clone(), ClientConnection::new(client_id.clone(), outbound_tx));
    info!("Client connected: {client_id} (total: {})", state.clients.len());

    let (mut ws_tx, mut ws_rx) = socket.split();

    let ack = ServerMessage::Connected(ConnectedAck {
        client_id: Some(client_id.clone()),
        message: Some("WebSocket connection established".into()),
        ..ConnectedAck::default()
    });
    match ack.encode() {
        Ok(frame) => {
            if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                error!("Failed to send connected ack to {client_id}: {e}");
                state.clients.remove(&client_id);
                return;
            }
        }
        Err(e) => error!("Failed to encode connected ack: {e}"),
    }

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match handle_frame(&state, &client_id, text.as_str()).encode() {
                            Ok(reply) => reply,
                            Err(e) => {
                                error!("Failed to encode reply for {client_id}: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = ws_tx.send(Message::Text(reply.into())).await {
                            error!("Failed to send reply to {client_id}: {e}");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed: {client_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {client_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                            error!("Failed to push to {client_id}: {e}");
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let frame = CloseFrame {
                            code: close_code::NORMAL,
                            reason: "server closing".to_string().into(),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        }
    }

    // Subscriptions live on the client entry and go with it.
    state.clients.remove(&client_id);
    info!("Client disconnected: {client_id} (total: {})", state.clients.len());
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Apply one client frame and build the reply.
fn handle_frame(state: &HubState, client_id: &str, text: &str) -> ServerMessage {
    let Some(mut client) = state.clients.get_mut(client_id) else {
        return error_reply("unknown client");
    };

    let message = match Envelope::decode(text).and_then(ClientMessage::try_from) {
        Ok(message) => message,
        Err(e) => {
            debug!("Bad frame from {client_id}: {e}");
            return error_reply(&e.to_string());
        }
    };

    match message {
        ClientMessage::SubscribeTask(task_id) => {
            client.subscribe(task_id);
            debug!("Client {client_id} subscribed to task {task_id}");
            ServerMessage::Subscribed(TaskSubscription { task_id })
        }
        ClientMessage::UnsubscribeTask(task_id) => {
            client.unsubscribe(task_id);
            debug!("Client {client_id} unsubscribed from task {task_id}");
            ServerMessage::Unsubscribed(TaskSubscription { task_id })
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

fn error_reply(message: &str) -> ServerMessage {
    ServerMessage::Error(ServerError {
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_client(id: &str) -> (HubState, mpsc::UnboundedReceiver<Outbound>) {
        let state = HubState {
            config: HubConfig::default(),
            clients: DashMap::new(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        state.clients.insert(id.to_string(), ClientConnection::new(id.to_string(), tx));
        (state, rx)
    }

    #[test]
    fn token_check() {
        let open = HubConfig::default();
        assert!(check_token(&open, Some("anything")).is_ok());
        assert!(check_token(&open, Some("")).is_err());
        assert!(check_token(&open, Some("  ")).is_err());
        assert!(check_token(&open, None).is_err());

        let locked = HubConfig {
            token: Some("abc".into()),
            ..HubConfig::default()
        };
        assert!(check_token(&locked, Some("abc")).is_ok());
        assert_eq!(check_token(&locked, Some("abd")), Err("invalid token"));
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let (state, _rx) = state_with_client("c1");

        let reply = handle_frame(&state, "c1", r#"{"type":"subscribe_task","data":{"task_id":42}}"#);
        assert_eq!(reply, ServerMessage::Subscribed(TaskSubscription { task_id: 42 }));
        assert!(state.clients.get("c1").unwrap().is_subscribed(42));

        let reply = handle_frame(&state, "c1", r#"{"type":"unsubscribe_task","task_id":42}"#);
        assert_eq!(reply, ServerMessage::Unsubscribed(TaskSubscription { task_id: 42 }));
        assert!(!state.clients.get("c1").unwrap().is_subscribed(42));
    }

    #[test]
    fn ping_gets_pong() {
        let (state, _rx) = state_with_client("c1");
        assert_eq!(handle_frame(&state, "c1", r#"{"type":"ping"}"#), ServerMessage::Pong);
    }

    #[test]
    fn bad_frames_get_error_reply() {
        let (state, _rx) = state_with_client("c1");
        for frame in ["not json", r#"{"type":"task_update","data":{}}"#, r#"{"type":"subscribe_task"}"#] {
            match handle_frame(&state, "c1", frame) {
                ServerMessage::Error(err) => assert!(!err.message.is_empty(), "{frame}"),
                other => panic!("expected error for {frame}, got {other:?}"),
            }
        }
    }
}
