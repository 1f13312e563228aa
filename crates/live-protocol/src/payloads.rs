//! Typed payloads carried in the `data` field of each message kind.

use serde::{Deserialize, Serialize};

/// Identifier of a backend task.
pub type TaskId = u64;

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of `connected`: the server has established the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectedAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Payload of `task_update`: progress of one running task.
///
/// Only `task_id` is guaranteed; a worker reports whichever fields it knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    /// Overall progress, in percent.
    #[serde(default)]
    pub progress: f64,
    /// Status label, present when the task changed status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Label of the step currently being worked on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    /// Progress of the current step, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_progress: Option<f64>,
    /// Playback position for media steps, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_current_time: Option<f64>,
    /// Media duration, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_total_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_courses: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_courses: Option<u64>,
}

impl TaskUpdate {
    pub fn new(task_id: TaskId, progress: f64) -> Self {
        Self {
            task_id,
            progress,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// `(completed, total)` when the worker reported both course counters.
    pub fn course_counts(&self) -> Option<(u64, u64)> {
        Some((self.completed_courses?, self.total_courses?))
    }

    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
    }
}

/// Severity of a [`Notification`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    #[serde(other)]
    Unknown,
}

/// Payload of `notification`: a human-readable system message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(default)]
    pub level: NotificationLevel,
}

impl Notification {
    pub fn new(message: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }
}

/// Payload of `error`: a protocol-level error reported by the server.
/// Receiving one never closes the connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Both directions
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of `subscribe_task` / `unsubscribe_task` and of their
/// `subscribed` / `unsubscribed` acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubscription {
    pub task_id: TaskId,
}
