//! Per-client connection state.

use std::collections::HashSet;

use live_protocol::TaskId;
use tokio::sync::mpsc;

/// Work queued for a client's socket by the rest of the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame to write.
    Frame(String),
    /// Close the socket (normal closure).
    Close,
}

/// A connected client and the tasks it follows.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: String,
    subscriptions: HashSet<TaskId>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ClientConnection {
    pub fn new(id: String, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            subscriptions: HashSet::new(),
            outbound,
        }
    }

    /// Returns `false` if already subscribed.
    pub fn subscribe(&mut self, task_id: TaskId) -> bool {
        self.subscriptions.insert(task_id)
    }

    /// Returns `false` if not subscribed.
    pub fn unsubscribe(&mut self, task_id: TaskId) -> bool {
        self.subscriptions.remove(&task_id)
    }

    pub fn is_subscribed(&self, task_id: TaskId) -> bool {
        self.subscriptions.contains(&task_id)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.subscriptions.iter().copied()
    }

    /// Queue a frame. Returns `false` once the socket task is gone.
    pub fn send(&self, frame: String) -> bool {
        self.outbound.send(Outbound::Frame(frame)).is_ok()
    }

    pub fn close(&self) -> bool {
        self.outbound.send(Outbound::Close).is_ok()
    }
}
