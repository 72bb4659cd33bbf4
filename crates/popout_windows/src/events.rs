//! Synchronous publish/subscribe channel for tracker notifications.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::{WindowId, WindowRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Initial enumeration finished. Emitted once.
    Ready,
    WindowCreated(WindowRecord),
    WindowRemoved(WindowId),
    FocusChanged(WindowRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&TrackerEvent) + Send + Sync>;

/// Handlers run in registration order on the emitting task.
///
/// The handler list is snapshotted before delivery, so a handler may
/// subscribe, unsubscribe or query the tracker without deadlocking.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<EventBusInner>>,
}

#[derive(Default)]
struct EventBusInner {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TrackerEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.handlers.push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(handler_id, _)| *handler_id != id);
        inner.handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn emit(&self, event: &TrackerEvent) {
        let handlers: Vec<Handler> = self
            .inner
            .lock()
            .handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.subscribe(move |_| seen.lock().push(tag));
        }
        bus.emit(&TrackerEvent::Ready);

        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_handler_can_subscribe_during_emit() {
        let bus = EventBus::new();
        let nested = bus.clone();
        bus.subscribe(move |_| {
            nested.subscribe(|_| {});
        });

        bus.emit(&TrackerEvent::Ready);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let id = bus.subscribe(move |_| *counter.lock() += 1);

        bus.emit(&TrackerEvent::Ready);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&TrackerEvent::Ready);

        assert_eq!(*count.lock(), 1);
    }
}
