//! Listener registry: message kind → set of handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use live_protocol::MessageKind;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

type Callback = dyn Fn(&Value) + Send + Sync;

/// A listener callback.
///
/// Handlers compare by identity: a clone is the same handler, two handlers
/// built from identical closures are not. Keep a clone around to
/// unregister it later.
#[derive(Clone)]
pub struct Handler(Arc<Callback>);

impl Handler {
    /// A handler receiving the raw `data` payload.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A handler receiving `data` decoded as `T`. Payloads that do not
    /// decode are logged and skipped.
    pub fn typed<T, F>(f: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::new(move |data| match T::deserialize(data) {
            Ok(payload) => f(payload),
            Err(e) => warn!(
                "Skipping payload that does not decode as {}: {e}",
                std::any::type_name::<T>()
            ),
        })
    }

    pub fn call(&self, data: &Value) {
        (self.0)(data)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.0))
    }
}

/// Handlers registered per message kind. Each kind holds a set: adding a
/// handler twice keeps one entry.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    handlers: HashMap<MessageKind, Vec<Handler>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the handler was already registered for `kind`.
    pub fn insert(&mut self, kind: MessageKind, handler: Handler) -> bool {
        let set = self.handlers.entry(kind).or_default();
        if set.contains(&handler) {
            return false;
        }
        set.push(handler);
        true
    }

    /// Returns `false` if the handler was not registered for `kind`.
    pub fn remove(&mut self, kind: &MessageKind, handler: &Handler) -> bool {
        let Some(set) = self.handlers.get_mut(kind) else {
            return false;
        };
        let before = set.len();
        set.retain(|h| h != handler);
        let removed = set.len() != before;
        if set.is_empty() {
            self.handlers.remove(kind);
        }
        removed
    }

    /// Snapshot of the handlers for `kind`, safe to invoke without holding
    /// the registry.
    pub fn handlers_for(&self, kind: &MessageKind) -> Vec<Handler> {
        self.handlers.get(kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: &MessageKind) -> usize {
        self.handlers.get(kind).map_or(0, Vec::len)
    }

    /// Total registrations across all kinds.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
