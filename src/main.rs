//! live-channel: live task updates over WebSocket.
//!
//! Two halves of the same channel:
//! - `serve` runs a development hub that clients can connect to
//! - `watch` connects to a hub, follows tasks, and prints their progress
//!
//! Usage:
//!   live-channel serve                                   # Port 8000, any token accepted
//!   live-channel serve --port 9000 --token mysecret      # Require a token
//!   live-channel watch --token mysecret --task 42        # Follow task 42
//!   live-channel watch --api-url http://host:8000/api --token t --task 1 --task 2

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use live_client::{Backoff, ConnectionManager, ConnectionState, Handler, ManagerConfig};
use live_hub::{Hub, HubConfig};
use live_protocol::{ConnectedAck, MessageKind, Notification, ServerError, TaskId, TaskSubscription, TaskUpdate};
use live_transport::endpoint_from_api_url;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "live-channel", about = "Live task updates over WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.live-channel/logs/live-channel.log if no path given)
    #[arg(long, global = true, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a development hub
    Serve(ServeArgs),
    /// Connect to a hub and print task updates
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Accepted token (any non-empty token if not provided)
    #[arg(long, conflicts_with = "random_token")]
    token: Option<String>,

    /// Generate a random token and require it
    #[arg(long)]
    random_token: bool,

    /// Maximum concurrent connections
    #[arg(long, default_value = "64")]
    max_connections: usize,

    /// Allow cross-origin browser clients
    #[arg(long)]
    cors: bool,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Channel endpoint (ws:// or wss://)
    #[arg(long, conflicts_with = "api_url")]
    url: Option<String>,

    /// REST API base URL to derive the channel endpoint from
    #[arg(long)]
    api_url: Option<String>,

    /// Credential sent as the `token` query parameter
    #[arg(long)]
    token: String,

    /// Task to follow (repeatable)
    #[arg(long = "task")]
    tasks: Vec<TaskId>,

    /// Reconnect attempts after a lost connection
    #[arg(long, default_value = "5")]
    max_attempts: u32,

    /// Fixed delay between reconnect attempts
    #[arg(long, default_value = "3000")]
    reconnect_delay_ms: u64,

    /// Use exponential backoff (1s doubling, capped at 30s) instead of a fixed delay
    #[arg(long)]
    exponential: bool,

    /// Ping interval while connected (0 disables)
    #[arg(long, default_value = "30000")]
    heartbeat_ms: u64,
}

impl WatchArgs {
    fn manager_config(&self) -> Result<ManagerConfig> {
        let mut config = ManagerConfig::default()
            .with_max_reconnect_attempts(self.max_attempts)
            .with_heartbeat_interval_ms(self.heartbeat_ms);

        if let Some(url) = &self.url {
            config.endpoint = url.clone();
        } else if let Some(api_url) = &self.api_url {
            config.endpoint = endpoint_from_api_url(api_url)
                .with_context(|| format!("cannot derive channel endpoint from {api_url}"))?;
        }

        config.backoff = if self.exponential {
            Backoff::exponential()
        } else {
            Backoff::Fixed {
                delay_ms: self.reconnect_delay_ms,
            }
        };
        Ok(config)
    }
}

fn init_tracing(verbose: bool, log_file: Option<&str>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(log_file_arg) = log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(());
    };

    let log_path = if log_file_arg == "DEFAULT" {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".live-channel/logs/live-channel.log")
    } else {
        PathBuf::from(log_file_arg)
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();

    eprintln!("Logging to {}", log_path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Watch(args) => watch(args).await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// serve
// ─────────────────────────────────────────────────────────────────────────────

fn random_token() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

async fn serve(args: ServeArgs) -> Result<()> {
    let token = if args.random_token {
        Some(random_token())
    } else {
        args.token
    };

    let config = HubConfig {
        port: args.port,
        hostname: args.hostname.clone(),
        token: token.clone(),
        max_connections: Some(args.max_connections),
        enable_cors: args.cors,
    };
    let mut hub = Hub::start(config).await.context("failed to start hub")?;

    println!();
    println!("  Live hub running");
    println!();
    println!("  Endpoint:   ws://{}:{}/ws/connect", args.hostname, hub.port());
    println!("  Health:     http://{}:{}/health", args.hostname, hub.port());
    match &token {
        Some(token) => println!("  Token:      {token}"),
        None => println!("  Token:      (any non-empty token)"),
    }
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;

    println!();
    println!("  Shutting down...");
    hub.stop().await;
    println!("  Hub stopped.");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// watch
// ─────────────────────────────────────────────────────────────────────────────

fn timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

fn describe(update: &TaskUpdate) -> String {
    let mut line = format!("task {}: {:.1}%", update.task_id, update.progress);
    if let Some(status) = &update.status {
        line.push_str(&format!(" [{status}]"));
    }
    if let Some((done, total)) = update.course_counts() {
        line.push_str(&format!(" courses {done}/{total}"));
    }
    if let Some(item) = &update.current_item {
        line.push_str(&format!(" - {item}"));
    }
    if let Some(message) = &update.message {
        line.push_str(&format!(" ({message})"));
    }
    if let Some(error) = &update.error_msg {
        line.push_str(&format!(" error: {error}"));
    }
    line
}

fn register_printers(manager: &ConnectionManager, tasks: Vec<TaskId>) {
    // Subscriptions do not survive a reconnect; renew them on every ack.
    let resubscriber = manager.clone();
    manager.on(
        MessageKind::Connected,
        &Handler::typed(move |ack: ConnectedAck| {
            println!(
                "[{}] connected{}",
                timestamp(),
                ack.client_id.map(|id| format!(" as {id}")).unwrap_or_default()
            );
            for task_id in &tasks {
                resubscriber.subscribe_task(*task_id);
            }
        }),
    );

    manager.on(
        MessageKind::Subscribed,
        &Handler::typed(|sub: TaskSubscription| {
            println!("[{}] following task {}", timestamp(), sub.task_id);
        }),
    );

    manager.on(
        MessageKind::TaskUpdate,
        &Handler::typed(|update: TaskUpdate| {
            println!("[{}] {}", timestamp(), describe(&update));
        }),
    );

    manager.on(
        MessageKind::Notification,
        &Handler::typed(|notification: Notification| {
            println!("[{}] {:?}: {}", timestamp(), notification.level, notification.message);
        }),
    );

    manager.on(
        MessageKind::Error,
        &Handler::typed(|error: ServerError| {
            eprintln!("[{}] server error: {}", timestamp(), error.message);
        }),
    );
}

async fn watch(args: WatchArgs) -> Result<()> {
    let config = args.manager_config()?;
    info!("Watching {} task(s) via {}", args.tasks.len(), config.endpoint);

    let manager = ConnectionManager::new(config);
    register_printers(&manager, args.tasks.clone());

    let mut states = manager.watch_state();
    let state_printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            if state == ConnectionState::Disconnected {
                println!("[{}] disconnected", timestamp());
            }
        }
    });

    manager.connect(args.token);

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;

    manager.disconnect();
    state_printer.abort();
    println!();
    println!("  Stopped.");
    Ok(())
}
