//! In-memory host for tests.
//!
//! Models the parts of a browser's window subsystem the popup logic cares
//! about: windows own ordered tabs, a window emptied by a tab move closes
//! itself, and a tab cannot be moved from a popup window straight into a
//! normal window. Notifications are queued and delivered explicitly with
//! [`deliver_events`] so tests control interleaving.

use std::collections::{BTreeMap, HashSet, VecDeque};

use parking_lot::Mutex;

use crate::error::{HostError, HostResult};
use crate::host::{HostEvent, WindowHost};
use crate::model::{
    CreateWindowOptions, MoveTarget, Tab, TabId, TabUpdate, Window, WindowId, WindowType,
    WindowUpdate,
};
use crate::WindowTracker;

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 768;

/// A host call as recorded by [`FakeHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    GetAllWindows,
    GetWindow(WindowId),
    CreateWindow(CreateWindowOptions),
    RemoveWindow(WindowId),
    MoveTab(TabId, MoveTarget),
    UpdateWindow(WindowId, WindowUpdate),
    UpdateTab(TabId, TabUpdate),
    QueryActiveTab,
}

#[derive(Debug, Clone)]
struct FakeWindow {
    window_type: WindowType,
    tabs: Vec<TabId>,
    active_tab: Option<TabId>,
    width: u32,
    height: u32,
    left: Option<i32>,
}

#[derive(Default)]
struct Failures {
    enumeration: bool,
    create_window: bool,
    remove_window: bool,
    move_into: HashSet<WindowId>,
}

#[derive(Default)]
struct FakeState {
    next_window_id: u64,
    next_tab_id: u64,
    windows: BTreeMap<WindowId, FakeWindow>,
    urls: BTreeMap<TabId, Option<String>>,
    focused: Option<WindowId>,
    events: VecDeque<HostEvent>,
    calls: Vec<HostCall>,
    failures: Failures,
}

impl FakeState {
    fn allocate_window(&mut self) -> WindowId {
        self.next_window_id += 1;
        WindowId(self.next_window_id)
    }

    fn allocate_tab(&mut self, url: Option<String>) -> TabId {
        self.next_tab_id += 1;
        let id = TabId(self.next_tab_id);
        self.urls.insert(id, url);
        id
    }

    fn window_of(&self, tab_id: TabId) -> Option<WindowId> {
        self.windows
            .iter()
            .find(|(_, window)| window.tabs.contains(&tab_id))
            .map(|(id, _)| *id)
    }

    fn describe(&self, id: WindowId) -> Option<Window> {
        self.windows.get(&id).map(|window| Window {
            id,
            window_type: window.window_type,
            focused: self.focused == Some(id),
            width: Some(window.width),
            height: Some(window.height),
        })
    }

    fn describe_tab(&self, tab_id: TabId) -> Option<Tab> {
        let window_id = self.window_of(tab_id)?;
        let window = self.windows.get(&window_id)?;
        let index = window.tabs.iter().position(|id| *id == tab_id)?;
        Some(Tab {
            id: tab_id,
            window_id,
            index,
            url: self.urls.get(&tab_id).cloned().flatten(),
        })
    }

    fn insert_window(&mut self, window: FakeWindow, focus: bool) -> WindowId {
        let id = self.allocate_window();
        self.windows.insert(id, window);
        if let Some(described) = self.describe(id) {
            self.events.push_back(HostEvent::Created(described));
        }
        if focus {
            self.focus(id);
        }
        id
    }

    fn focus(&mut self, id: WindowId) {
        self.focused = Some(id);
        self.events.push_back(HostEvent::FocusChanged(id));
    }

    fn close(&mut self, id: WindowId) -> bool {
        let Some(window) = self.windows.remove(&id) else {
            return false;
        };
        for tab in window.tabs {
            self.urls.remove(&tab);
        }
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.events.push_back(HostEvent::Removed(id));
        true
    }

    /// Detach a tab from its window, closing the window if it empties.
    fn detach(&mut self, tab_id: TabId) -> Option<WindowId> {
        let source = self.window_of(tab_id)?;
        let emptied = match self.windows.get_mut(&source) {
            Some(window) => {
                window.tabs.retain(|id| *id != tab_id);
                if window.active_tab == Some(tab_id) {
                    window.active_tab = window.tabs.first().copied();
                }
                window.tabs.is_empty()
            }
            None => false,
        };
        if emptied {
            self.close(source);
        }
        Some(source)
    }
}

/// In-memory [`WindowHost`] with queued notifications and injectable
/// failures.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a focused window holding one tab per url.
    pub fn open_window(&self, window_type: WindowType, urls: &[&str]) -> (WindowId, Vec<Tab>) {
        self.open_window_sized(window_type, urls, DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    pub fn open_window_sized(
        &self,
        window_type: WindowType,
        urls: &[&str],
        width: u32,
        height: u32,
    ) -> (WindowId, Vec<Tab>) {
        let mut state = self.state.lock();
        let tabs: Vec<TabId> = urls
            .iter()
            .map(|url| state.allocate_tab(Some(url.to_string())))
            .collect();
        let id = state.insert_window(
            FakeWindow {
                window_type,
                active_tab: tabs.first().copied(),
                tabs: tabs.clone(),
                width,
                height,
                left: None,
            },
            true,
        );
        let described = tabs
            .iter()
            .filter_map(|tab| state.describe_tab(*tab))
            .collect();
        (id, described)
    }

    /// Simulate the user closing a window.
    pub fn close_window(&self, id: WindowId) -> bool {
        self.state.lock().close(id)
    }

    /// Simulate the user focusing a window.
    pub fn focus_window(&self, id: WindowId) {
        let mut state = self.state.lock();
        if state.windows.contains_key(&id) {
            state.focus(id);
        }
    }

    pub fn resize_window(&self, id: WindowId, width: u32, height: u32) {
        if let Some(window) = self.state.lock().windows.get_mut(&id) {
            window.width = width;
            window.height = height;
        }
    }

    pub fn take_events(&self) -> Vec<HostEvent> {
        self.state.lock().events.drain(..).collect()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn window(&self, id: WindowId) -> Option<Window> {
        self.state.lock().describe(id)
    }

    pub fn window_left(&self, id: WindowId) -> Option<i32> {
        self.state.lock().windows.get(&id).and_then(|w| w.left)
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.state.lock().windows.keys().copied().collect()
    }

    pub fn tab(&self, id: TabId) -> Option<Tab> {
        self.state.lock().describe_tab(id)
    }

    pub fn tabs_in(&self, id: WindowId) -> Vec<TabId> {
        self.state
            .lock()
            .windows
            .get(&id)
            .map(|w| w.tabs.clone())
            .unwrap_or_default()
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.state.lock().focused
    }

    pub fn active_tab_of(&self, id: WindowId) -> Option<TabId> {
        self.state.lock().windows.get(&id).and_then(|w| w.active_tab)
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state.lock().failures.enumeration = fail;
    }

    pub fn fail_create_window(&self, fail: bool) {
        self.state.lock().failures.create_window = fail;
    }

    pub fn fail_remove_window(&self, fail: bool) {
        self.state.lock().failures.remove_window = fail;
    }

    /// Reject every tab move whose target is `id`.
    pub fn fail_moves_into(&self, id: WindowId) {
        self.state.lock().failures.move_into.insert(id);
    }
}

impl WindowHost for FakeHost {
    async fn get_all_windows(&self, types: &[WindowType]) -> HostResult<Vec<Window>> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::GetAllWindows);
        if state.failures.enumeration {
            return Err(HostError::Disconnected);
        }
        let ids: Vec<_> = state.windows.keys().copied().collect();
        Ok(ids
            .into_iter()
            .filter_map(|id| state.describe(id))
            .filter(|window| types.contains(&window.window_type))
            .collect())
    }

    async fn get_window(&self, id: WindowId) -> HostResult<Window> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::GetWindow(id));
        state.describe(id).ok_or(HostError::NoSuchWindow(id))
    }

    async fn create_window(&self, options: CreateWindowOptions) -> HostResult<Window> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::CreateWindow(options.clone()));
        if state.failures.create_window {
            return Err(HostError::rejected("create_window", "injected failure"));
        }

        let tab = match options.tab_id {
            Some(tab_id) => {
                if state.detach(tab_id).is_none() {
                    return Err(HostError::NoSuchTab(tab_id));
                }
                tab_id
            }
            None => state.allocate_tab(options.url.clone()),
        };

        let id = state.insert_window(
            FakeWindow {
                window_type: options.window_type.unwrap_or(WindowType::Normal),
                tabs: vec![tab],
                active_tab: Some(tab),
                width: options.width.unwrap_or(DEFAULT_WIDTH),
                height: options.height.unwrap_or(DEFAULT_HEIGHT),
                left: options.left,
            },
            options.focused.unwrap_or(true),
        );
        state.describe(id).ok_or(HostError::NoSuchWindow(id))
    }

    async fn remove_window(&self, id: WindowId) -> HostResult<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::RemoveWindow(id));
        if state.failures.remove_window {
            return Err(HostError::rejected("remove_window", "injected failure"));
        }
        if state.close(id) {
            Ok(())
        } else {
            Err(HostError::NoSuchWindow(id))
        }
    }

    async fn move_tab(&self, tab_id: TabId, target: MoveTarget) -> HostResult<Tab> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::MoveTab(tab_id, target));
        if state.failures.move_into.contains(&target.window_id) {
            return Err(HostError::NoSuchWindow(target.window_id));
        }
        let target_type = state
            .windows
            .get(&target.window_id)
            .map(|w| w.window_type)
            .ok_or(HostError::NoSuchWindow(target.window_id))?;
        let source = state.window_of(tab_id).ok_or(HostError::NoSuchTab(tab_id))?;
        let source_type = state.windows.get(&source).map(|w| w.window_type);
        if source_type == Some(WindowType::Popup) && target_type == WindowType::Normal {
            return Err(HostError::rejected(
                "move_tab",
                "tabs cannot be moved from a popup into a normal window",
            ));
        }

        if source == target.window_id {
            if let Some(window) = state.windows.get_mut(&source) {
                window.tabs.retain(|id| *id != tab_id);
                let index = target.index.unwrap_or(window.tabs.len()).min(window.tabs.len());
                window.tabs.insert(index, tab_id);
            }
        } else {
            state.detach(tab_id);
            if let Some(window) = state.windows.get_mut(&target.window_id) {
                let index = target.index.unwrap_or(window.tabs.len()).min(window.tabs.len());
                window.tabs.insert(index, tab_id);
            }
        }
        state.describe_tab(tab_id).ok_or(HostError::NoSuchTab(tab_id))
    }

    async fn update_window(&self, id: WindowId, update: WindowUpdate) -> HostResult<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::UpdateWindow(id, update));
        let Some(window) = state.windows.get_mut(&id) else {
            return Err(HostError::NoSuchWindow(id));
        };
        if let Some(left) = update.left {
            window.left = Some(left);
        }
        if update.focused == Some(true) {
            state.focus(id);
        }
        Ok(())
    }

    async fn update_tab(&self, id: TabId, update: TabUpdate) -> HostResult<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::UpdateTab(id, update));
        let window_id = state.window_of(id).ok_or(HostError::NoSuchTab(id))?;
        if update.active == Some(true) {
            if let Some(window) = state.windows.get_mut(&window_id) {
                window.active_tab = Some(id);
            }
        }
        Ok(())
    }

    async fn query_active_tab(&self) -> HostResult<Option<Tab>> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::QueryActiveTab);
        let active = state
            .focused
            .and_then(|id| state.windows.get(&id))
            .and_then(|window| window.active_tab);
        Ok(active.and_then(|tab| state.describe_tab(tab)))
    }
}

/// Deliver every queued host notification to `tracker`, in order.
pub fn deliver_events(host: &FakeHost, tracker: &WindowTracker) {
    for event in host.take_events() {
        tracker.handle_host_event(event);
    }
}
