//! Event Dispatcher
//!
//! Multi-subscriber publish/subscribe keyed by [`EventKind`]. Knows nothing
//! about transports.
//!
//! # Delivery
//!
//! - `publish` fans out to every handler currently registered for the
//!   event's kind, in subscription order.
//! - Handlers are isolated: a panicking handler is logged and the remaining
//!   handlers still receive the event.
//! - The handler list is snapshotted before delivery, so handlers may
//!   subscribe, unsubscribe or clear the table re-entrantly.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::events::{EventKind, StreamEvent};

/// Callback invoked for each published event
pub type EventHandler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscription table with fan-out delivery
pub struct EventDispatcher {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, EventHandler)>>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for one event kind
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler
    ///
    /// Returns `false` (and does nothing else) if the handler is unknown.
    pub fn unsubscribe(&self, kind: &EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let Some(list) = handlers.get_mut(kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(kind);
        }
        removed
    }

    /// Deliver an event to every current subscriber of its kind
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn publish(&self, event: &StreamEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<EventHandler> = match self.handlers.read().get(&kind) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(event = %kind, "Event handler panicked; continuing delivery");
            }
        }
        delivered
    }

    /// Remove every handler for every kind
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Number of handlers registered for a kind
    #[must_use]
    pub fn subscriber_count(&self, kind: &EventKind) -> usize {
        self.handlers.read().get(kind).map_or(0, Vec::len)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventDispatcher")
            .field("kinds", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> EventHandler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |tag: &'static str| -> EventHandler {
            let log = Arc::clone(&log_clone);
            Arc::new(move |event: &StreamEvent| {
                log.lock().push(format!("{tag}:{}", event.kind()));
            })
        };
        (log, make)
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let dispatcher = EventDispatcher::new();
        let (log, make) = recorder();
        let first = make("a");
        let second = make("b");
        dispatcher.subscribe(EventKind::Frame, move |e| first(e));
        dispatcher.subscribe(EventKind::Frame, move |e| second(e));

        let delivered = dispatcher.publish(&StreamEvent::Frame("f".into()));

        assert_eq!(delivered, 2);
        assert_eq!(*log.lock(), vec!["a:frame", "b:frame"]);
    }

    #[test]
    fn test_publish_only_reaches_matching_kind() {
        let dispatcher = EventDispatcher::new();
        let (log, make) = recorder();
        let handler = make("x");
        dispatcher.subscribe(EventKind::Analysis, move |e| handler(e));

        assert_eq!(dispatcher.publish(&StreamEvent::Frame("f".into())), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let dispatcher = EventDispatcher::new();
        let (log, make) = recorder();
        let survivor = make("ok");
        dispatcher.subscribe(EventKind::Error, |_| panic!("handler failure"));
        dispatcher.subscribe(EventKind::Error, move |e| survivor(e));

        let delivered = dispatcher.publish(&StreamEvent::error("boom"));

        assert_eq!(delivered, 1);
        assert_eq!(*log.lock(), vec!["ok:error"]);
    }

    #[test]
    fn test_unsubscribe() {
        let dispatcher = EventDispatcher::new();
        let (log, make) = recorder();
        let handler = make("gone");
        let id = dispatcher.subscribe(EventKind::Connected, move |e| handler(e));

        assert!(dispatcher.unsubscribe(&EventKind::Connected, id));
        dispatcher.publish(&StreamEvent::Connected);

        assert!(log.lock().is_empty());
        assert_eq!(dispatcher.subscriber_count(&EventKind::Connected), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let dispatcher = EventDispatcher::new();
        let id = dispatcher.subscribe(EventKind::Frame, |_| {});

        assert!(!dispatcher.unsubscribe(&EventKind::Analysis, id));
        assert!(!dispatcher.unsubscribe(&EventKind::Frame, SubscriptionId(9999)));
        assert_eq!(dispatcher.subscriber_count(&EventKind::Frame), 1);
    }

    #[test]
    fn test_clear_removes_all_kinds() {
        let dispatcher = EventDispatcher::new();
        dispatcher.subscribe(EventKind::Frame, |_| {});
        dispatcher.subscribe(EventKind::Analysis, |_| {});

        dispatcher.clear();

        assert_eq!(dispatcher.subscriber_count(&EventKind::Frame), 0);
        assert_eq!(dispatcher.subscriber_count(&EventKind::Analysis), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_publish() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let weak = Arc::downgrade(&dispatcher);
        let calls = Arc::new(AtomicU64::new(0));
        let calls_clone = Arc::clone(&calls);
        dispatcher.subscribe(EventKind::Frame, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = weak.upgrade() {
                d.clear();
            }
        });

        dispatcher.publish(&StreamEvent::Frame("1".into()));
        dispatcher.publish(&StreamEvent::Frame("2".into()));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
