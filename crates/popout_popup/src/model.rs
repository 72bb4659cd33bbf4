use std::time::Duration;

use popout_windows::{TabId, WindowId, WindowState};

/// Relationship metadata for a popup this system created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRecord {
    pub window_id: WindowId,
    /// Window the tab came from. May be stale by the time of a merge.
    pub parent_window_id: Option<WindowId>,
    /// Re-insertion index in the parent; `None` appends.
    pub tab_index: Option<usize>,
    /// Size-memory key; `None` when the content URL has no origin.
    pub origin: Option<String>,
}

/// Where a merging tab should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeTarget {
    Existing {
        window_id: WindowId,
        index: Option<usize>,
        placement: MergePlacement,
    },
    NewWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePlacement {
    /// Returned to the recorded parent window.
    Restored,
    /// Parent was gone; appended to the most recently focused normal window.
    Fallback,
    /// No normal window existed; the tab got a window of its own.
    NewWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The tab's window is not a popup this system tracks.
    NotTracked,
    Merged {
        window_id: WindowId,
        tab_id: TabId,
        placement: MergePlacement,
    },
}

/// Tunables for [`crate::PopupStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct PopupConfig {
    /// Horizontal position of the temporary window used while merging.
    pub offscreen_left: i32,
    /// Window state requested for new popups.
    pub popup_state: Option<WindowState>,
    pub remember_sizes: bool,
    pub size_sweep_interval: Duration,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            offscreen_left: 9999,
            popup_state: None,
            remember_sizes: true,
            size_sweep_interval: Duration::from_secs(60),
        }
    }
}
