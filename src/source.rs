//! Event-source seam.
//!
//! The multiplexer never binds to a concrete event system; it talks to the
//! [`EventSource`] trait. By using a trait, we enable:
//! - In-memory sources for testing and embedded use
//! - Adapters over real event systems (OS signals, UI toolkits, watchers)
//!
//! Handler identity is preserved through `Arc` pointer identity: the same
//! handler clone passed to `subscribe` can later be passed to `unsubscribe`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Raw event handler installed on an event source.
///
/// Cloning is cheap and clones share identity for unsubscription purposes.
pub type RawHandler = Arc<dyn Fn() + Send + Sync>;

/// Contract required from the host event system.
pub trait EventSource: Send + Sync {
    /// Install `handler` for events named `event_name`.
    fn subscribe(&self, event_name: &str, handler: RawHandler);

    /// Remove a previously installed handler.
    ///
    /// Matching is by `Arc` pointer identity; removing a handler that was
    /// never installed is a no-op.
    fn unsubscribe(&self, event_name: &str, handler: &RawHandler);
}

/// In-memory event source.
///
/// Intended for embedded usage, tests, and as a reference implementation.
/// Events are fired synchronously on the emitting thread via [`Self::emit`].
#[derive(Default)]
pub struct LocalSource {
    handlers: Mutex<HashMap<String, Vec<RawHandler>>>,
}

impl LocalSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one raw event.
    ///
    /// Invokes a snapshot of the handlers installed for `event_name` at call
    /// time, in subscription order. Handlers may subscribe or unsubscribe
    /// without deadlocking; such changes take effect on the next emit.
    pub fn emit(&self, event_name: &str) {
        let snapshot: Vec<RawHandler> = {
            let Ok(handlers) = self.handlers.lock() else {
                return;
            };
            handlers.get(event_name).cloned().unwrap_or_default()
        };

        for handler in snapshot {
            handler();
        }
    }

    /// Number of handlers currently installed for `event_name`.
    #[must_use]
    pub fn handler_count(&self, event_name: &str) -> usize {
        self.handlers
            .lock()
            .map_or(0, |handlers| handlers.get(event_name).map_or(0, Vec::len))
    }
}

impl EventSource for LocalSource {
    fn subscribe(&self, event_name: &str, handler: RawHandler) {
        let Ok(mut handlers) = self.handlers.lock() else {
            return;
        };
        handlers
            .entry(event_name.to_string())
            .or_default()
            .push(handler);
    }

    fn unsubscribe(&self, event_name: &str, handler: &RawHandler) {
        let Ok(mut handlers) = self.handlers.lock() else {
            return;
        };
        if let Some(installed) = handlers.get_mut(event_name) {
            installed.retain(|h| !Arc::ptr_eq(h, handler));
            if installed.is_empty() {
                handlers.remove(event_name);
            }
        }
    }
}

impl std::fmt::Debug for LocalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events = self.handlers.lock().map_or(0, |h| h.len());
        f.debug_struct("LocalSource").field("events", &events).finish()
    }
}
