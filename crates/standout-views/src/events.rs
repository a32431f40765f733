//! Event dispatcher used for view creators and composers.
//!
//! Listeners are registered against an event name or a wildcard pattern ending
//! in `*` (`"composing: *"`, `"composing: admin.*"`). Each listener receives the
//! event name and a mutable payload, which for view events is the view data.
//!
//! Queued listeners hand the payload to an injected [`QueueDispatcher`] instead
//! of running in-process. The dispatcher is always constructible without a
//! queue; a missing queue only surfaces as [`ViewError::QueueUnavailable`]
//! when a queued listener actually fires.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, trace};

use crate::error::ViewError;
use crate::ViewData;

/// Callback invoked with the event name and its mutable payload.
pub type ListenerFn = dyn Fn(&str, &mut ViewData) + Send + Sync;

/// Capability for deferring events to a queue.
pub trait QueueDispatcher: Send + Sync {
    /// Enqueues `payload` for `event`.
    fn push(
        &self,
        event: &str,
        payload: ViewData,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Clone)]
enum Listener {
    Sync(Arc<ListenerFn>),
    Queued,
}

/// Dispatches named events to registered listeners.
#[derive(Default)]
pub struct Dispatcher {
    listeners: RwLock<Vec<(String, Listener)>>,
    queue: Option<Arc<dyn QueueDispatcher>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects the queue capability used by queued listeners.
    pub fn with_queue(mut self, queue: Arc<dyn QueueDispatcher>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn has_queue(&self) -> bool {
        self.queue.is_some()
    }

    /// Registers a listener for an event name or `*`-suffixed pattern.
    pub fn listen<F>(&self, pattern: impl Into<String>, listener: F)
    where
        F: Fn(&str, &mut ViewData) + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        debug!(pattern = %pattern, "listener registered");
        self.write()
            .push((pattern, Listener::Sync(Arc::new(listener))));
    }

    /// Registers a listener that forwards matching events to the queue.
    pub fn listen_queued(&self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        debug!(pattern = %pattern, "queued listener registered");
        self.write().push((pattern, Listener::Queued));
    }

    /// Whether any listener matches `event`.
    pub fn has_listeners(&self, event: &str) -> bool {
        self.read()
            .iter()
            .any(|(pattern, _)| matches_event(pattern, event))
    }

    /// Removes every listener registered under exactly `pattern`.
    pub fn forget(&self, pattern: &str) {
        self.write().retain(|(p, _)| p != pattern);
    }

    /// Runs every matching listener in registration order.
    ///
    /// Stops at the first queued listener that cannot be delivered.
    pub fn dispatch(&self, event: &str, payload: &mut ViewData) -> Result<(), ViewError> {
        // Snapshot so listeners may register further listeners.
        let listeners: Vec<Listener> = self
            .read()
            .iter()
            .filter(|(pattern, _)| matches_event(pattern, event))
            .map(|(_, listener)| listener.clone())
            .collect();

        if listeners.is_empty() {
            return Ok(());
        }
        trace!(event, count = listeners.len(), "dispatching event");

        for listener in listeners {
            match listener {
                Listener::Sync(f) => f(event, payload),
                Listener::Queued => self.push(event, payload.clone())?,
            }
        }
        Ok(())
    }

    /// Sends `payload` straight to the queue.
    pub fn push(&self, event: &str, payload: ViewData) -> Result<(), ViewError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| ViewError::QueueUnavailable {
                event: event.to_string(),
            })?;
        queue.push(event, payload).map_err(|e| ViewError::Queue {
            event: event.to_string(),
            message: e.to_string(),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<(String, Listener)>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<(String, Listener)>> {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<String> = self.read().iter().map(|(p, _)| p.clone()).collect();
        f.debug_struct("Dispatcher")
            .field("listeners", &patterns)
            .field("queue", &self.queue.is_some())
            .finish()
    }
}

fn matches_event(pattern: &str, event: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => event.starts_with(prefix),
        None => pattern == event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingQueue {
        pushed: Mutex<Vec<(String, ViewData)>>,
    }

    impl QueueDispatcher for RecordingQueue {
        fn push(
            &self,
            event: &str,
            payload: ViewData,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.pushed.lock().unwrap().push((event.to_string(), payload));
            Ok(())
        }
    }

    #[test]
    fn test_wildcard_matching() {
        assert!(matches_event("composing: *", "composing: home"));
        assert!(matches_event("composing: admin.*", "composing: admin.users"));
        assert!(!matches_event("composing: admin.*", "composing: home"));
        assert!(matches_event("creating: home", "creating: home"));
        assert!(!matches_event("creating: home", "creating: homepage"));
    }

    #[test]
    fn test_listeners_mutate_payload_in_order() {
        let events = Dispatcher::new();
        events.listen("composing: *", |_, data| {
            data.insert("seen".into(), json!(1));
        });
        events.listen("composing: home", |name, data| {
            let seen = data["seen"].as_i64().unwrap_or(0);
            data.insert("seen".into(), json!(seen + 1));
            data.insert("event".into(), json!(name));
        });

        let mut payload = ViewData::new();
        events.dispatch("composing: home", &mut payload).unwrap();

        assert_eq!(payload["seen"], json!(2));
        assert_eq!(payload["event"], json!("composing: home"));
    }

    #[test]
    fn test_forget_removes_pattern() {
        let events = Dispatcher::new();
        events.listen("creating: home", |_, _| {});
        assert!(events.has_listeners("creating: home"));

        events.forget("creating: home");
        assert!(!events.has_listeners("creating: home"));
    }

    #[test]
    fn test_missing_queue_fails_only_when_queued() {
        let events = Dispatcher::new();
        assert!(!events.has_queue());

        let mut payload = ViewData::new();
        events.dispatch("creating: home", &mut payload).unwrap();

        events.listen_queued("creating: *");
        let err = events.dispatch("creating: home", &mut payload).unwrap_err();
        assert!(matches!(err, ViewError::QueueUnavailable { ref event } if event == "creating: home"));
    }

    #[test]
    fn test_queued_listener_pushes_payload() {
        let queue = Arc::new(RecordingQueue::default());
        let events = Dispatcher::new().with_queue(queue.clone());
        events.listen_queued("creating: *");

        let mut payload = ViewData::new();
        payload.insert("id".into(), json!(7));
        events.dispatch("creating: home", &mut payload).unwrap();

        let pushed = queue.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, "creating: home");
        assert_eq!(pushed[0].1["id"], json!(7));
    }
}
