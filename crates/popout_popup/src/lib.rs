//! Popup relationship store.
//!
//! Creates popup windows with parent/index bookkeeping and remembered
//! sizes, and merges a popup's tab back into a normal window. A tab cannot
//! be moved from a popup straight into a normal window, so a merge first
//! wraps the tab in an off-screen temporary window and moves it from there.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = Arc::new(PopupStore::new(host, storage, tracker.clone(), PopupConfig::default()));
//! let sweep = store.spawn_size_sweep();
//!
//! let record = store.create_popup(&tab).await?;
//! // ... later, from inside the popup
//! store.merge_popup(&tab_in_popup).await?;
//! ```

pub mod error;
pub mod model;
pub mod size_memory;
pub mod storage;

pub use error::{PopupError, PopupResult, StorageError, StorageResult};
pub use model::{MergeOutcome, MergePlacement, MergeTarget, PopupConfig, PopupRecord};
pub use size_memory::{SizeMemory, WindowSize};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use parking_lot::Mutex;
use popout_shared::diagnostics;
use popout_windows::{
    CreateWindowOptions, HostError, MoveTarget, SubscriptionId, Tab, TabId, TabUpdate,
    TrackerEvent, WindowHost, WindowId, WindowTracker, WindowType, WindowUpdate,
};
use tokio::task::JoinHandle;

/// Horizontal position a temporary window is moved to when it has to stay.
const ONSCREEN_LEFT: i32 = 0;

/// Popup relationship records plus the create/merge protocol.
///
/// Records are dropped when the tracker reports their window removed, when
/// a merge completes, or when a size sweep finds the window gone.
pub struct PopupStore<H, S> {
    host: Arc<H>,
    tracker: WindowTracker,
    sizes: SizeMemory<S>,
    popups: Arc<Mutex<HashMap<WindowId, PopupRecord>>>,
    config: PopupConfig,
    subscription: SubscriptionId,
}

/// A two-phase move that failed, with the temporary window it left behind.
struct MoveFailure {
    temporary: Option<WindowId>,
    error: HostError,
}

impl<H: WindowHost, S: KeyValueStorage> PopupStore<H, S> {
    pub fn new(host: Arc<H>, storage: Arc<S>, tracker: WindowTracker, config: PopupConfig) -> Self {
        let popups: Arc<Mutex<HashMap<WindowId, PopupRecord>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let records = popups.clone();
        let subscription = tracker.subscribe(move |event| {
            if let TrackerEvent::WindowRemoved(id) = event {
                if records.lock().remove(id).is_some() {
                    diagnostics::event("popup_forgotten", &[("window", &id), ("reason", &"removed")]);
                }
            }
        });

        Self {
            host,
            tracker,
            sizes: SizeMemory::new(storage),
            popups,
            config,
            subscription,
        }
    }

    pub fn config(&self) -> &PopupConfig {
        &self.config
    }

    pub fn tracker(&self) -> &WindowTracker {
        &self.tracker
    }

    pub fn size_memory(&self) -> &SizeMemory<S> {
        &self.sizes
    }

    pub fn record(&self, window_id: WindowId) -> Option<PopupRecord> {
        self.popups.lock().get(&window_id).cloned()
    }

    /// All records, ordered by window id.
    pub fn records(&self) -> Vec<PopupRecord> {
        let mut records: Vec<_> = self.popups.lock().values().cloned().collect();
        records.sort_by_key(|record| record.window_id);
        records
    }

    pub fn is_tracked_popup(&self, window_id: WindowId) -> bool {
        self.popups.lock().contains_key(&window_id)
    }

    pub fn len(&self) -> usize {
        self.popups.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the record for `window_id`, returning it if present.
    pub fn forget(&self, window_id: WindowId) -> Option<PopupRecord> {
        self.popups.lock().remove(&window_id)
    }

    /// Detach `tab` into a new popup window.
    pub async fn create_popup(&self, tab: &Tab) -> PopupResult<PopupRecord> {
        let url = tab.url.as_deref();
        let options = self
            .popup_options(CreateWindowOptions::wrapping_tab(tab.id), url)
            .await;
        let window = self.host.create_window(options).await?;

        Ok(self.insert(PopupRecord {
            window_id: window.id,
            parent_window_id: Some(tab.window_id),
            tab_index: Some(tab.index),
            origin: url.and_then(resolve_origin),
        }))
    }

    /// Open `url` in a new popup, anchored next to `parent_tab`.
    ///
    /// A link opened from inside a tracked popup inherits that popup's
    /// anchor, so merge targets never point at another popup.
    pub async fn create_popup_from_url(&self, parent_tab: &Tab, url: &str) -> PopupResult<PopupRecord> {
        let (parent_window_id, tab_index) = match self.record(parent_tab.window_id) {
            Some(parent) => (parent.parent_window_id, parent.tab_index),
            None => (Some(parent_tab.window_id), Some(parent_tab.index + 1)),
        };
        let options = self
            .popup_options(CreateWindowOptions::navigating_to(url), Some(url))
            .await;
        let window = self.host.create_window(options).await?;

        Ok(self.insert(PopupRecord {
            window_id: window.id,
            parent_window_id,
            tab_index,
            origin: resolve_origin(url),
        }))
    }

    /// Where a merge of `record` would go right now.
    pub fn resolve_target(&self, record: &PopupRecord) -> MergeTarget {
        if let Some(parent) = record.parent_window_id {
            if self.tracker.get(parent).is_some_and(|window| window.is_normal()) {
                return MergeTarget::Existing {
                    window_id: parent,
                    index: record.tab_index,
                    placement: MergePlacement::Restored,
                };
            }
        }
        match self.tracker.most_recently_focused(false) {
            Some(window) => MergeTarget::Existing {
                window_id: window.id,
                index: None,
                placement: MergePlacement::Fallback,
            },
            None => MergeTarget::NewWindow,
        }
    }

    /// Move `tab` out of its popup into a normal window and close the popup.
    pub async fn merge_popup(&self, tab: &Tab) -> PopupResult<MergeOutcome> {
        let Some(record) = self.record(tab.window_id) else {
            diagnostics::event(
                "popup_merge_skipped",
                &[("window", &tab.window_id), ("reason", &"not_tracked")],
            );
            return Ok(MergeOutcome::NotTracked);
        };

        if let Err(err) = self.persist_size(&record).await {
            log::debug!("size not saved before merge of {}: {}", record.window_id, err);
        }

        let mut temporaries = Vec::new();
        let outcome = match self.resolve_target(&record) {
            MergeTarget::NewWindow => self.move_into_new_window(tab.id).await?,
            MergeTarget::Existing {
                window_id,
                index,
                placement,
            } => match self.move_through_temporary_window(tab.id, window_id, index).await {
                Ok(moved) => MergeOutcome::Merged {
                    window_id: moved.window_id,
                    tab_id: moved.id,
                    placement,
                },
                Err(failure) => {
                    diagnostics::event(
                        "popup_merge_fallback",
                        &[
                            ("window", &record.window_id),
                            ("target", &window_id),
                            ("error", &failure.error),
                        ],
                    );
                    temporaries.extend(failure.temporary);
                    self.merge_fallback(tab.id, window_id, &mut temporaries)
                        .await?
                }
            },
        };

        for temporary in temporaries {
            self.discard_window(temporary).await;
        }
        // The host may already have closed the emptied popup.
        if self.tracker.contains(record.window_id) {
            self.discard_window(record.window_id).await;
        }
        self.forget(record.window_id);

        if let MergeOutcome::Merged {
            window_id,
            placement,
            ..
        } = outcome
        {
            diagnostics::event(
                "popup_merged",
                &[
                    ("window", &record.window_id),
                    ("target", &window_id),
                    ("placement", &format!("{:?}", placement)),
                ],
            );
        }
        Ok(outcome)
    }

    /// Remember the size of `tab`'s window under its exact URL and origin.
    ///
    /// Returns the saved size, or `None` when the tab has no URL, the URL has
    /// no origin, or the host did not report dimensions.
    pub async fn save_size(&self, tab: &Tab) -> PopupResult<Option<WindowSize>> {
        let Some(url) = tab.url.as_deref() else {
            return Ok(None);
        };
        let window = self.host.get_window(tab.window_id).await?;
        let Some(size) = WindowSize::of(&window) else {
            return Ok(None);
        };
        if !self.sizes.remember_url(url, size).await? {
            log::warn!("cannot find origin for {}", url);
            return Ok(None);
        }
        diagnostics::event(
            "popup_size_saved",
            &[
                ("window", &tab.window_id),
                ("width", &size.width),
                ("height", &size.height),
            ],
        );
        Ok(Some(size))
    }

    /// Persist the current size of every tracked popup with an origin.
    ///
    /// Records whose window the host no longer knows are dropped. Returns
    /// the number of sizes written.
    pub async fn sweep_sizes(&self) -> usize {
        let mut saved = 0;
        for record in self.records() {
            match self.persist_size(&record).await {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(PopupError::Host(err)) if err.is_missing_window() => {
                    self.forget(record.window_id);
                    diagnostics::event(
                        "popup_forgotten",
                        &[("window", &record.window_id), ("reason", &"missing")],
                    );
                }
                Err(err) => log::warn!("size sweep failed for {}: {}", record.window_id, err),
            }
        }
        saved
    }

    /// Run `sweep_sizes` now and then once per configured interval until the
    /// returned handle is aborted.
    pub fn spawn_size_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                store.sweep_sizes().await;
                tokio::time::sleep(store.config.size_sweep_interval).await;
            }
        })
    }

    async fn popup_options(&self, base: CreateWindowOptions, url: Option<&str>) -> CreateWindowOptions {
        let mut options = base
            .with_type(WindowType::Popup)
            .with_state(self.config.popup_state);
        if let Some(size) = self.remembered_size(url).await {
            options = options.with_size(size.width, size.height);
        }
        options
    }

    async fn remembered_size(&self, url: Option<&str>) -> Option<WindowSize> {
        if !self.config.remember_sizes {
            return None;
        }
        match self.sizes.lookup(url?).await {
            Ok(size) => size,
            Err(err) => {
                log::warn!("size lookup failed: {}", err);
                None
            }
        }
    }

    fn insert(&self, record: PopupRecord) -> PopupRecord {
        diagnostics::event(
            "popup_created",
            &[
                ("window", &record.window_id),
                ("parent", &display_or_none(record.parent_window_id)),
                ("index", &display_or_none(record.tab_index)),
            ],
        );
        self.popups.lock().insert(record.window_id, record.clone());
        record
    }

    /// Write the popup's current size under its origin. `Ok(false)` when
    /// there is nothing to write.
    async fn persist_size(&self, record: &PopupRecord) -> PopupResult<bool> {
        if !self.config.remember_sizes {
            return Ok(false);
        }
        let Some(origin) = record.origin.as_deref() else {
            return Ok(false);
        };
        let window = self.host.get_window(record.window_id).await?;
        let Some(size) = WindowSize::of(&window) else {
            return Ok(false);
        };
        self.sizes.remember_origin(origin, size).await?;
        Ok(true)
    }

    async fn merge_fallback(
        &self,
        tab_id: TabId,
        failed_target: WindowId,
        temporaries: &mut Vec<WindowId>,
    ) -> PopupResult<MergeOutcome> {
        let mut exclude = vec![failed_target];
        exclude.extend(temporaries.iter().copied());

        if let Some(window) = self.tracker.most_recently_focused_normal_except(&exclude) {
            match self.move_through_temporary_window(tab_id, window.id, None).await {
                Ok(moved) => {
                    return Ok(MergeOutcome::Merged {
                        window_id: moved.window_id,
                        tab_id: moved.id,
                        placement: MergePlacement::Fallback,
                    });
                }
                Err(failure) => {
                    diagnostics::event(
                        "popup_merge_fallback_failed",
                        &[("target", &window.id), ("error", &failure.error)],
                    );
                    temporaries.extend(failure.temporary);
                }
            }
        }
        match self.move_into_new_window(tab_id).await {
            Ok(outcome) => Ok(outcome),
            // The newest temporary window holds the tab; keep it as the tab's
            // new home rather than leaving it off-screen.
            Err(err) => match temporaries.pop() {
                Some(temporary) => Ok(self.reveal_temporary_window(temporary, tab_id, &err).await),
                None => Err(err),
            },
        }
    }

    async fn reveal_temporary_window(
        &self,
        window_id: WindowId,
        tab_id: TabId,
        cause: &PopupError,
    ) -> MergeOutcome {
        diagnostics::event(
            "popup_merge_kept_temporary",
            &[("window", &window_id), ("error", cause)],
        );
        let (window_result, tab_result) = futures::future::join(
            self.host
                .update_window(window_id, WindowUpdate::focus().with_left(ONSCREEN_LEFT)),
            self.host.update_tab(tab_id, TabUpdate { active: Some(true) }),
        )
        .await;
        for err in [window_result.err(), tab_result.err()].into_iter().flatten() {
            log::warn!("revealing window {} failed: {}", window_id, err);
        }
        MergeOutcome::Merged {
            window_id,
            tab_id,
            placement: MergePlacement::NewWindow,
        }
    }

    async fn move_through_temporary_window(
        &self,
        tab_id: TabId,
        window_id: WindowId,
        index: Option<usize>,
    ) -> Result<Tab, MoveFailure> {
        let temporary = self
            .host
            .create_window(
                CreateWindowOptions::wrapping_tab(tab_id).with_left(self.config.offscreen_left),
            )
            .await
            .map_err(|error| MoveFailure {
                temporary: None,
                error,
            })?
            .id;

        // The target may have closed while the temporary window was created.
        if !self.tracker.contains(window_id) {
            return Err(MoveFailure {
                temporary: Some(temporary),
                error: HostError::NoSuchWindow(window_id),
            });
        }

        let moved = self
            .host
            .move_tab(tab_id, MoveTarget { window_id, index })
            .await
            .map_err(|error| MoveFailure {
                temporary: Some(temporary),
                error,
            })?;
        self.focus_tab(&moved).await;
        Ok(moved)
    }

    async fn move_into_new_window(&self, tab_id: TabId) -> PopupResult<MergeOutcome> {
        let window = self
            .host
            .create_window(
                CreateWindowOptions::wrapping_tab(tab_id)
                    .with_type(WindowType::Normal)
                    .with_focused(true),
            )
            .await?;
        Ok(MergeOutcome::Merged {
            window_id: window.id,
            tab_id,
            placement: MergePlacement::NewWindow,
        })
    }

    async fn focus_tab(&self, tab: &Tab) {
        let (window_result, tab_result) = futures::future::join(
            self.host.update_window(tab.window_id, WindowUpdate::focus()),
            self.host.update_tab(tab.id, TabUpdate { active: Some(true) }),
        )
        .await;
        for err in [window_result.err(), tab_result.err()].into_iter().flatten() {
            log::debug!("focusing merged tab {} failed: {}", tab.id, err);
        }
    }

    /// Best-effort window removal; failures are expected when the host has
    /// already closed the window.
    async fn discard_window(&self, window_id: WindowId) {
        if let Err(err) = self.host.remove_window(window_id).await {
            diagnostics::event(
                "popup_cleanup_ignored",
                &[("window", &window_id), ("error", &err)],
            );
        }
    }
}

impl<H, S> Drop for PopupStore<H, S> {
    fn drop(&mut self) {
        self.tracker.events().unsubscribe(self.subscription);
    }
}

fn resolve_origin(url: &str) -> Option<String> {
    let origin = size_memory::origin_of(url);
    if origin.is_none() {
        log::warn!("cannot find origin for {}", url);
    }
    origin.map(str::to_string)
}

fn display_or_none<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "none".to_string())
}
