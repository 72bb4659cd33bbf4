//! Live view of the host's windows and their focus recency.
//!
//! The tracker is seeded by an initial enumeration and kept current by the
//! host's create/remove/focus notifications. Both paths may interleave in
//! any order; inserts are idempotent by window id and removals observed
//! while enumeration is in flight are remembered so a stale enumeration
//! snapshot cannot resurrect a closed window.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let tracker = WindowTracker::new();
//! tracker.subscribe(|event| {
//!     if matches!(event, TrackerEvent::Ready | TrackerEvent::FocusChanged(_)) {
//!         refresh_menus();
//!     }
//! });
//! tracker.initialize(&host).await;
//!
//! // Host notifications
//! tracker.handle_host_event(HostEvent::FocusChanged(id));
//!
//! if tracker.is_current_window_popup() { /* ... */ }
//! ```

pub mod error;
pub mod events;
pub mod host;
pub mod model;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{HostError, HostResult};
pub use events::{EventBus, SubscriptionId, TrackerEvent};
pub use host::{HostEvent, WindowHost};
pub use model::{
    CreateWindowOptions, MoveTarget, Tab, TabId, TabUpdate, Window, WindowId, WindowRecord,
    WindowState, WindowType, WindowUpdate,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use popout_shared::diagnostics;

/// Window types requested from the host during enumeration.
pub const TRACKED_WINDOW_TYPES: [WindowType; 2] = [WindowType::Normal, WindowType::Popup];

/// Shared handle to the tracked window set.
///
/// Cloning is cheap; clones observe the same state and event bus.
#[derive(Clone, Default)]
pub struct WindowTracker {
    inner: Arc<Mutex<TrackerInner>>,
    events: EventBus,
}

#[derive(Default)]
struct TrackerInner {
    windows: HashMap<WindowId, WindowRecord>,
    clock: u64,
    ready: bool,
    /// Ids removed before enumeration completed.
    removed_before_ready: HashSet<WindowId>,
}

impl TrackerInner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl WindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TrackerEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    /// Enumerate existing windows and signal readiness.
    ///
    /// Enumeration failure is logged; readiness is still signalled with
    /// whatever the event stream has populated so far.
    pub async fn initialize<H: WindowHost>(&self, host: &H) {
        match host.get_all_windows(&TRACKED_WINDOW_TYPES).await {
            Ok(windows) => self.finish_enumeration(windows),
            Err(err) => {
                log::warn!("window enumeration failed: {}", err);
                diagnostics::event("tracker_enumeration_failed", &[("error", &err)]);
                self.finish_enumeration(Vec::new());
            }
        }
    }

    /// Merge an enumeration snapshot into the tracked set and emit `Ready`
    /// the first time it is called.
    pub fn finish_enumeration(&self, mut windows: Vec<Window>) {
        // The focused window gets the newest stamp.
        windows.sort_by_key(|w| w.focused);

        let first_ready = {
            let mut inner = self.inner.lock();
            for window in windows {
                if !window.window_type.is_tracked()
                    || inner.removed_before_ready.contains(&window.id)
                    || inner.windows.contains_key(&window.id)
                {
                    continue;
                }
                let last_active = inner.tick();
                inner.windows.insert(
                    window.id,
                    WindowRecord {
                        id: window.id,
                        window_type: window.window_type,
                        last_active,
                    },
                );
            }
            let first_ready = !inner.ready;
            inner.ready = true;
            inner.removed_before_ready.clear();
            first_ready
        };

        if first_ready {
            diagnostics::event("tracker_ready", &[("windows", &self.len())]);
            self.events.emit(&TrackerEvent::Ready);
        }
    }

    pub fn handle_host_event(&self, event: HostEvent) {
        match event {
            HostEvent::Created(window) => self.on_window_created(&window),
            HostEvent::Removed(id) => self.on_window_removed(id),
            HostEvent::FocusChanged(id) => self.on_focus_changed(id),
        }
    }

    pub fn on_window_created(&self, window: &Window) {
        if !window.window_type.is_tracked() {
            return;
        }
        let record = {
            let mut inner = self.inner.lock();
            let record = WindowRecord {
                id: window.id,
                window_type: window.window_type,
                last_active: inner.tick(),
            };
            inner.windows.insert(window.id, record);
            record
        };
        self.events.emit(&TrackerEvent::WindowCreated(record));
    }

    /// Unknown ids are ignored; removal may race with other bookkeeping.
    pub fn on_window_removed(&self, id: WindowId) {
        let removed = {
            let mut inner = self.inner.lock();
            if !inner.ready {
                inner.removed_before_ready.insert(id);
            }
            inner.windows.remove(&id).is_some()
        };
        if removed {
            self.events.emit(&TrackerEvent::WindowRemoved(id));
        }
    }

    pub fn on_focus_changed(&self, id: WindowId) {
        let record = {
            let mut inner = self.inner.lock();
            let stamp = inner.tick();
            match inner.windows.get_mut(&id) {
                Some(record) => {
                    record.last_active = stamp;
                    *record
                }
                None => return,
            }
        };
        self.events.emit(&TrackerEvent::FocusChanged(record));
    }

    /// Most recently focused tracked window, optionally skipping popups.
    pub fn most_recently_focused(&self, include_popups: bool) -> Option<WindowRecord> {
        self.most_recent_where(|record| include_popups || !record.is_popup())
    }

    /// Most recently focused normal window not listed in `exclude`.
    pub fn most_recently_focused_normal_except(
        &self,
        exclude: &[WindowId],
    ) -> Option<WindowRecord> {
        self.most_recent_where(|record| record.is_normal() && !exclude.contains(&record.id))
    }

    fn most_recent_where(&self, filter: impl Fn(&WindowRecord) -> bool) -> Option<WindowRecord> {
        let inner = self.inner.lock();
        inner
            .windows
            .values()
            .filter(|record| filter(record))
            .max_by_key(|record| (record.last_active, record.id))
            .copied()
    }

    pub fn is_current_window_popup(&self) -> bool {
        self.most_recently_focused(true)
            .is_some_and(|record| record.is_popup())
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.inner.lock().windows.contains_key(&id)
    }

    pub fn get(&self, id: WindowId) -> Option<WindowRecord> {
        self.inner.lock().windows.get(&id).copied()
    }

    /// Snapshot of all tracked records, ordered by id.
    pub fn windows(&self) -> Vec<WindowRecord> {
        let mut records: Vec<_> = self.inner.lock().windows.values().copied().collect();
        records.sort_by_key(|record| record.id);
        records
    }

    pub fn len(&self) -> usize {
        self.inner.lock().windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHost, deliver_events};

    fn window(id: u64, window_type: WindowType) -> Window {
        Window {
            id: WindowId(id),
            window_type,
            focused: false,
            width: None,
            height: None,
        }
    }

    fn ids(tracker: &WindowTracker) -> Vec<u64> {
        tracker.windows().iter().map(|record| record.id.0).collect()
    }

    #[tokio::test]
    async fn test_initialize_seeds_normal_and_popup_windows() {
        let host = FakeHost::new();
        let (normal, _) = host.open_window(WindowType::Normal, &["https://a.test/"]);
        let (popup, _) = host.open_window(WindowType::Popup, &["https://b.test/"]);
        host.open_window(WindowType::Other, &["devtools://x"]);
        host.take_events();

        let tracker = WindowTracker::new();
        let ready = Arc::new(Mutex::new(0));
        let counter = ready.clone();
        tracker.subscribe(move |event| {
            if *event == TrackerEvent::Ready {
                *counter.lock() += 1;
            }
        });

        tracker.initialize(&host).await;

        assert!(tracker.is_ready());
        assert_eq!(ids(&tracker), vec![normal.0, popup.0]);
        assert_eq!(*ready.lock(), 1, "ready must fire exactly once");

        tracker.finish_enumeration(Vec::new());
        assert_eq!(*ready.lock(), 1);
    }

    #[tokio::test]
    async fn test_initialize_failure_still_signals_ready() {
        let host = FakeHost::new();
        host.fail_enumeration(true);
        let tracker = WindowTracker::new();
        tracker.on_window_created(&window(4, WindowType::Normal));

        tracker.initialize(&host).await;

        assert!(tracker.is_ready());
        assert_eq!(ids(&tracker), vec![4]);
    }

    #[test]
    fn test_enumeration_marks_focused_window_most_recent() {
        let tracker = WindowTracker::new();
        let mut focused = window(1, WindowType::Popup);
        focused.focused = true;
        tracker.finish_enumeration(vec![focused, window(2, WindowType::Normal)]);

        assert!(tracker.is_current_window_popup());
        assert_eq!(tracker.most_recently_focused(false).unwrap().id, WindowId(2));
    }

    #[test]
    fn test_created_during_enumeration_is_not_duplicated() {
        let tracker = WindowTracker::new();
        let snapshot = vec![window(1, WindowType::Normal), window(2, WindowType::Popup)];

        tracker.on_window_created(&window(2, WindowType::Popup));
        tracker.on_window_created(&window(3, WindowType::Normal));
        tracker.finish_enumeration(snapshot);

        assert_eq!(ids(&tracker), vec![1, 2, 3]);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_removed_during_enumeration_is_not_resurrected() {
        let tracker = WindowTracker::new();
        // Snapshot taken before window 2 closed; its removal arrives first.
        let snapshot = vec![window(1, WindowType::Normal), window(2, WindowType::Normal)];

        tracker.on_window_removed(WindowId(2));
        tracker.finish_enumeration(snapshot);

        assert_eq!(ids(&tracker), vec![1]);
    }

    #[test]
    fn test_created_then_removed_during_enumeration() {
        let tracker = WindowTracker::new();
        let snapshot = vec![window(1, WindowType::Normal), window(5, WindowType::Popup)];

        tracker.on_window_created(&window(5, WindowType::Popup));
        tracker.on_window_removed(WindowId(5));
        tracker.finish_enumeration(snapshot);

        assert_eq!(ids(&tracker), vec![1]);
    }

    #[test]
    fn test_every_interleaving_matches_host_state() {
        // Host history: 1 open at start, 2 created, 1 removed, 3 created.
        // Enumeration snapshot may be taken at any point of that history and
        // the event stream may be applied before or after it lands.
        let history = [
            HostEvent::Created(window(2, WindowType::Normal)),
            HostEvent::Removed(WindowId(1)),
            HostEvent::Created(window(3, WindowType::Popup)),
        ];
        let snapshots: Vec<Vec<Window>> = vec![
            vec![window(1, WindowType::Normal)],
            vec![window(1, WindowType::Normal), window(2, WindowType::Normal)],
            vec![window(2, WindowType::Normal)],
            vec![window(2, WindowType::Normal), window(3, WindowType::Popup)],
        ];

        for (taken_after, snapshot) in snapshots.iter().enumerate() {
            for landed_after in taken_after..=history.len() {
                let tracker = WindowTracker::new();
                // Events before the snapshot was taken were delivered
                // before initialization started.
                for event in &history[..landed_after] {
                    tracker.handle_host_event(event.clone());
                }
                tracker.finish_enumeration(snapshot.clone());
                for event in &history[landed_after..] {
                    tracker.handle_host_event(event.clone());
                }
                assert_eq!(
                    ids(&tracker),
                    vec![2, 3],
                    "snapshot {} landing after {} events",
                    taken_after,
                    landed_after
                );
            }
        }
    }

    #[test]
    fn test_focus_updates_recency_and_notifies() {
        let tracker = WindowTracker::new();
        tracker.finish_enumeration(vec![
            window(1, WindowType::Normal),
            window(2, WindowType::Normal),
        ]);
        let focused = Arc::new(Mutex::new(Vec::new()));
        let seen = focused.clone();
        tracker.subscribe(move |event| {
            if let TrackerEvent::FocusChanged(record) = event {
                seen.lock().push(record.id);
            }
        });

        tracker.on_focus_changed(WindowId(1));
        assert_eq!(tracker.most_recently_focused(false).unwrap().id, WindowId(1));
        tracker.on_focus_changed(WindowId(2));
        assert_eq!(tracker.most_recently_focused(false).unwrap().id, WindowId(2));

        assert_eq!(*focused.lock(), vec![WindowId(1), WindowId(2)]);
    }

    #[test]
    fn test_focus_for_unknown_window_is_ignored() {
        let tracker = WindowTracker::new();
        tracker.finish_enumeration(vec![window(1, WindowType::Normal)]);
        let notified = Arc::new(Mutex::new(false));
        let flag = notified.clone();
        tracker.subscribe(move |_| *flag.lock() = true);

        tracker.on_focus_changed(WindowId(99));

        assert!(!*notified.lock());
        assert_eq!(ids(&tracker), vec![1]);
    }

    #[test]
    fn test_focus_subscriber_sees_updated_state() {
        let tracker = WindowTracker::new();
        tracker.finish_enumeration(vec![
            window(1, WindowType::Normal),
            window(2, WindowType::Popup),
        ]);
        let observed = Arc::new(Mutex::new(None));
        let observer = tracker.clone();
        let slot = observed.clone();
        tracker.subscribe(move |event| {
            if matches!(event, TrackerEvent::FocusChanged(_)) {
                *slot.lock() = Some(observer.is_current_window_popup());
            }
        });

        tracker.on_focus_changed(WindowId(2));

        assert_eq!(*observed.lock(), Some(true));
    }

    #[test]
    fn test_most_recently_focused_without_popups_never_returns_popup() {
        let tracker = WindowTracker::new();
        tracker.finish_enumeration(vec![
            window(1, WindowType::Popup),
            window(2, WindowType::Normal),
            window(3, WindowType::Popup),
        ]);
        for id in [2, 1, 3] {
            tracker.on_focus_changed(WindowId(id));
            let record = tracker.most_recently_focused(false).unwrap();
            assert!(!record.is_popup());
            assert_eq!(record.id, WindowId(2));
        }
        assert_eq!(tracker.most_recently_focused(true).unwrap().id, WindowId(3));

        tracker.on_window_removed(WindowId(2));
        assert!(tracker.most_recently_focused(false).is_none());
        assert!(tracker.is_current_window_popup());
    }

    #[test]
    fn test_most_recently_focused_normal_except_skips_listed() {
        let tracker = WindowTracker::new();
        tracker.finish_enumeration(vec![
            window(1, WindowType::Normal),
            window(2, WindowType::Normal),
        ]);
        tracker.on_focus_changed(WindowId(2));

        let record = tracker
            .most_recently_focused_normal_except(&[WindowId(2)])
            .unwrap();
        assert_eq!(record.id, WindowId(1));
        assert!(
            tracker
                .most_recently_focused_normal_except(&[WindowId(1), WindowId(2)])
                .is_none()
        );
    }

    #[test]
    fn test_repeated_removal_is_idempotent() {
        let tracker = WindowTracker::new();
        tracker.finish_enumeration(vec![
            window(1, WindowType::Normal),
            window(2, WindowType::Popup),
        ]);
        let removals = Arc::new(Mutex::new(0));
        let counter = removals.clone();
        tracker.subscribe(move |event| {
            if matches!(event, TrackerEvent::WindowRemoved(_)) {
                *counter.lock() += 1;
            }
        });

        tracker.on_window_removed(WindowId(2));
        tracker.on_window_removed(WindowId(2));
        tracker.on_window_removed(WindowId(42));

        assert_eq!(ids(&tracker), vec![1]);
        assert_eq!(*removals.lock(), 1);
    }

    #[test]
    fn test_other_window_types_are_not_tracked() {
        let tracker = WindowTracker::new();
        tracker.on_window_created(&window(9, WindowType::Other));
        assert!(tracker.is_empty());
        assert!(!tracker.is_current_window_popup());
    }

    #[tokio::test]
    async fn test_host_events_keep_tracker_in_sync() {
        let host = FakeHost::new();
        let (first, _) = host.open_window(WindowType::Normal, &["https://a.test/"]);
        host.take_events();
        let tracker = WindowTracker::new();
        tracker.initialize(&host).await;

        let (second, _) = host.open_window(WindowType::Popup, &["https://b.test/"]);
        host.close_window(first);
        deliver_events(&host, &tracker);

        assert_eq!(ids(&tracker), vec![second.0]);
        assert!(tracker.is_current_window_popup());
    }
}
