//! Window and tab data model shared by the tracker and its consumers.
//!
//! Shapes follow what the host windowing subsystem reports, with absent
//! fields expressed as `Option` instead of sentinels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque window handle assigned by the host. Never reused while the
/// process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque tab handle assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Normal,
    Popup,
    /// Panels, devtools and anything else the host may report.
    Other,
}

impl WindowType {
    /// Only normal and popup windows take part in relationship tracking.
    pub fn is_tracked(self) -> bool {
        matches!(self, WindowType::Normal | WindowType::Popup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    Normal,
    Minimized,
    Maximized,
    Fullscreen,
}

/// A window as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub id: WindowId,
    #[serde(rename = "type")]
    pub window_type: WindowType,
    #[serde(default)]
    pub focused: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    pub index: usize,
    pub url: Option<String>,
}

/// Tracker-owned view of a live window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRecord {
    pub id: WindowId,
    pub window_type: WindowType,
    /// Logical focus stamp. Strictly increasing across all records.
    pub last_active: u64,
}

impl WindowRecord {
    pub fn is_popup(&self) -> bool {
        self.window_type == WindowType::Popup
    }

    pub fn is_normal(&self) -> bool {
        self.window_type == WindowType::Normal
    }
}

/// Options for `WindowHost::create_window`.
///
/// When `tab_id` is set the host moves that tab into the new window and
/// `url` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWindowOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub window_type: Option<WindowType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<WindowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
}

impl CreateWindowOptions {
    pub fn wrapping_tab(tab_id: TabId) -> Self {
        Self {
            tab_id: Some(tab_id),
            ..Self::default()
        }
    }

    pub fn navigating_to(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, window_type: WindowType) -> Self {
        self.window_type = Some(window_type);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_state(mut self, state: Option<WindowState>) -> Self {
        self.state = state;
        self
    }

    pub fn with_left(mut self, left: i32) -> Self {
        self.left = Some(left);
        self
    }

    pub fn with_focused(mut self, focused: bool) -> Self {
        self.focused = Some(focused);
        self
    }
}

/// Destination of `WindowHost::move_tab`. `index: None` appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTarget {
    pub window_id: WindowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<i32>,
}

impl WindowUpdate {
    pub fn focus() -> Self {
        Self {
            focused: Some(true),
            ..Self::default()
        }
    }

    pub fn with_left(mut self, left: i32) -> Self {
        self.left = Some(left);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}
