//! The connection manager and the task that drives it.
//!
//! [`ConnectionManager`] is a cheap, cloneable handle. Every clone talks to
//! one background task (the driver) which owns the transport, the reconnect
//! counter, the credential, and both timers. The handle and the driver share
//! only the listener registry, the published state, and a session epoch.
//!
//! `connect` and `disconnect` bump the epoch before handing the command to
//! the driver. Anything the driver produced for an older epoch (an open
//! that completes late, a frame already in flight, a timer) is discarded.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use live_protocol::auth::validate_credential;
use live_protocol::{ClientMessage, Envelope, MessageKind, TaskId};
use live_transport::{
    Connection, ConnectFuture, Connector, TransportError, WebSocketConnector, channel_url,
};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::listeners::{Handler, ListenerRegistry};
use crate::state::ConnectionState;

struct Shared {
    state: watch::Sender<ConnectionState>,
    epoch: u64,
    listeners: ListenerRegistry,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn publish(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

enum Command {
    Connect {
        epoch: u64,
        credential: SecretString,
    },
    Disconnect {
        epoch: u64,
    },
    Send {
        epoch: u64,
        kind: MessageKind,
        frame: String,
    },
}

/// Client for the live update channel.
///
/// All methods return immediately. Failures are logged, never returned:
/// sending while disconnected drops the frame, a lost transport is retried
/// in the background.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Mutex<Shared>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &shared.state())
            .field("listeners", &shared.listeners.len())
            .finish()
    }
}

impl ConnectionManager {
    /// A manager opening WebSocket connections.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_connector(config, WebSocketConnector::new())
    }

    pub fn with_connector(config: ManagerConfig, connector: impl Connector) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Mutex::new(Shared {
            state,
            epoch: 0,
            listeners: ListenerRegistry::new(),
        }));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            config,
            connector: Box::new(connector),
            shared: shared.clone(),
            commands: command_rx,
            epoch: 0,
            credential: None,
            attempts: 0,
            pending: None,
            connection: None,
            reconnect_at: None,
            heartbeat_at: None,
        };
        tokio::spawn(driver.run());

        Self { shared, commands }
    }

    /// Open an authenticated connection with `credential`.
    ///
    /// No-op while already connected. Otherwise any pending attempt or
    /// scheduled reconnect is abandoned and the reconnect counter resets.
    /// An empty credential is rejected with a warning.
    pub fn connect(&self, credential: impl Into<String>) {
        let credential = credential.into();
        if let Err(e) = validate_credential(&credential) {
            warn!("Not connecting: {e}");
            return;
        }

        let epoch = {
            let mut shared = self.shared.lock();
            if shared.state().is_connected() {
                debug!("Already connected");
                return;
            }
            shared.epoch += 1;
            shared.publish(ConnectionState::Connecting);
            shared.epoch
        };

        self.command(Command::Connect {
            epoch,
            credential: SecretString::from(credential),
        });
    }

    /// Close the connection, cancel every timer, and drop all listeners.
    /// Safe to call in any state.
    pub fn disconnect(&self) {
        let epoch = {
            let mut shared = self.shared.lock();
            shared.epoch += 1;
            shared.listeners.clear();
            shared.publish(ConnectionState::Disconnected);
            shared.epoch
        };
        self.command(Command::Disconnect { epoch });
    }

    /// Register `handler` for frames of `kind`. Registering the same
    /// handler twice for one kind keeps a single entry. Listeners survive
    /// reconnects but not [`disconnect`](Self::disconnect).
    ///
    /// A listener that captures a clone of this manager keeps the driver
    /// task alive after every other handle is dropped. Call
    /// [`disconnect`](Self::disconnect) to release it.
    pub fn on(&self, kind: impl Into<MessageKind>, handler: &Handler) {
        let kind = kind.into();
        if !self.shared.lock().listeners.insert(kind.clone(), handler.clone()) {
            debug!("Listener already registered for `{kind}`");
        }
    }

    /// Register a closure and return its handle for a later [`off`](Self::off).
    /// Same lifetime rules as [`on`](Self::on).
    pub fn on_fn<F>(&self, kind: impl Into<MessageKind>, f: F) -> Handler
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let handler = Handler::new(f);
        self.on(kind, &handler);
        handler
    }

    pub fn off(&self, kind: impl Into<MessageKind>, handler: &Handler) {
        let kind = kind.into();
        self.shared.lock().listeners.remove(&kind, handler);
    }

    /// Send a `{type, data}` frame. Dropped with a warning unless connected;
    /// frames are never queued.
    pub fn send<T: Serialize + ?Sized>(&self, kind: impl Into<MessageKind>, payload: &T) {
        let kind = kind.into();
        let epoch = {
            let shared = self.shared.lock();
            if !shared.state().is_connected() {
                warn!("Dropping `{kind}` frame: not connected");
                return;
            }
            shared.epoch
        };

        let frame = match Envelope::from_payload(kind.clone(), payload).and_then(|e| e.encode()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping `{kind}` frame: {e}");
                return;
            }
        };
        self.command(Command::Send { epoch, kind, frame });
    }

    pub fn send_message(&self, message: ClientMessage) {
        match message.into_envelope() {
            Ok(envelope) => self.send(envelope.kind, &envelope.data),
            Err(e) => warn!("Dropping client message: {e}"),
        }
    }

    pub fn subscribe_task(&self, task_id: TaskId) {
        self.send_message(ClientMessage::SubscribeTask(task_id));
    }

    pub fn unsubscribe_task(&self, task_id: TaskId) {
        self.send_message(ClientMessage::UnsubscribeTask(task_id));
    }

    pub fn ping(&self) {
        self.send_message(ClientMessage::Ping);
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.lock().state.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.lock().listeners.len()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            error!("Connection driver is gone");
        }
    }
}

/// Owns the transport. Runs until every handle is dropped.
struct Driver {
    config: ManagerConfig,
    connector: Box<dyn Connector>,
    shared: Arc<Mutex<Shared>>,
    commands: mpsc::UnboundedReceiver<Command>,
    epoch: u64,
    credential: Option<SecretString>,
    attempts: u32,
    pending: Option<ConnectFuture>,
    connection: Option<Connection>,
    reconnect_at: Option<Instant>,
    heartbeat_at: Option<Instant>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                result = opened(&mut self.pending), if self.pending.is_some() => {
                    self.pending = None;
                    self.on_open(result);
                }
                frame = next_frame(&mut self.connection), if self.connection.is_some() => {
                    match frame {
                        Some(Ok(text)) => self.dispatch(&text),
                        Some(Err(e)) => {
                            warn!("Transport error: {e}");
                            self.on_loss();
                        }
                        None => {
                            info!("Connection closed");
                            self.on_loss();
                        }
                    }
                }
                _ = sleep_until_deadline(self.reconnect_at), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.open();
                }
                _ = sleep_until_deadline(self.heartbeat_at), if self.heartbeat_at.is_some() => {
                    self.heartbeat().await;
                }
            }
        }

        self.teardown();
        debug!("Connection driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { epoch, credential } => {
                self.epoch = epoch;
                self.teardown();
                self.attempts = 0;
                self.credential = Some(credential);
                self.open();
            }
            Command::Disconnect { epoch } => {
                self.epoch = epoch;
                self.teardown();
                self.attempts = 0;
                self.credential = None;
                info!("Disconnected");
            }
            Command::Send { epoch, kind, frame } => {
                if epoch != self.epoch || self.connection.is_none() {
                    warn!("Dropping `{kind}` frame: not connected");
                    return;
                }
                self.write(&kind, frame).await;
            }
        }
    }

    /// Start an attempt with the stored credential.
    fn open(&mut self) {
        let Some(credential) = &self.credential else {
            return;
        };
        let url = match channel_url(&self.config.endpoint, credential.expose_secret()) {
            Ok(url) => url,
            Err(e) => {
                error!("Cannot connect: {e}");
                self.credential = None;
                self.publish(ConnectionState::Disconnected);
                return;
            }
        };

        if !self.publish(ConnectionState::Connecting) {
            return;
        }
        info!(
            "Connecting to {}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.port().map(|p| format!(":{p}")).unwrap_or_default()
        );
        self.pending = Some(self.connector.connect(&url));
    }

    fn on_open(&mut self, result: Result<Connection, TransportError>) {
        match result {
            Ok(connection) => {
                if !self.publish(ConnectionState::Connected) {
                    close(connection);
                    return;
                }
                info!("Connected");
                self.attempts = 0;
                self.connection = Some(connection);
                self.heartbeat_at = self.config.heartbeat_interval().map(|i| Instant::now() + i);
            }
            Err(e) => {
                warn!("Connection failed: {e}");
                self.on_loss();
            }
        }
    }

    /// The transport closed or failed: schedule a reconnect while attempts
    /// remain.
    fn on_loss(&mut self) {
        self.teardown();
        if !self.publish(ConnectionState::Disconnected) || self.credential.is_none() {
            return;
        }

        let max = self.config.max_reconnect_attempts;
        if self.attempts >= max {
            warn!("Giving up after {max} reconnect attempts");
            return;
        }

        self.attempts += 1;
        let delay = self.config.backoff.delay(self.attempts);
        info!(
            "Reconnecting in {}ms (attempt {}/{max})",
            delay.as_millis(),
            self.attempts
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn dispatch(&self, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring malformed frame: {e}");
                return;
            }
        };

        let handlers = {
            let shared = self.shared.lock();
            if shared.epoch != self.epoch {
                return;
            }
            shared.listeners.handlers_for(&envelope.kind)
        };
        if handlers.is_empty() {
            debug!("No listeners for `{}`", envelope.kind);
            return;
        }

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler.call(&envelope.data))).is_err() {
                error!("Listener for `{}` panicked", envelope.kind);
            }
        }
    }

    async fn heartbeat(&mut self) {
        self.heartbeat_at = self.config.heartbeat_interval().map(|i| Instant::now() + i);
        match ClientMessage::Ping.into_envelope().and_then(|e| e.encode()) {
            Ok(frame) => self.write(&MessageKind::Ping, frame).await,
            Err(e) => warn!("Cannot encode ping: {e}"),
        }
    }

    async fn write(&mut self, kind: &MessageKind, frame: String) {
        let Some(connection) = self.connection.as_mut() else {
            warn!("Dropping `{kind}` frame: not connected");
            return;
        };
        if let Err(e) = connection.sink.send(frame).await {
            warn!("Failed to send `{kind}` frame: {e}");
            self.on_loss();
        }
    }

    /// Publish `state` unless a newer `connect`/`disconnect` owns the state.
    fn publish(&self, state: ConnectionState) -> bool {
        let shared = self.shared.lock();
        if shared.epoch != self.epoch {
            return false;
        }
        shared.publish(state);
        true
    }

    /// Drop the pending attempt, both timers, and the transport.
    fn teardown(&mut self) {
        self.pending = None;
        self.reconnect_at = None;
        self.heartbeat_at = None;
        if let Some(connection) = self.connection.take() {
            close(connection);
        }
    }
}

fn close(mut connection: Connection) {
    tokio::spawn(async move {
        if let Err(e) = connection.sink.close().await {
            debug!("Error closing transport: {e}");
        }
    });
}

async fn opened(pending: &mut Option<ConnectFuture>) -> Result<Connection, TransportError> {
    match pending {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(connection: &mut Option<Connection>) -> Option<Result<String, TransportError>> {
    match connection {
        Some(connection) => connection.stream.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
