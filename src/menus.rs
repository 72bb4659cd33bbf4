//! Context menu items and their visibility state.
//!
//! The model only tracks which items should be shown; registering and
//! rendering them is up to the host.

use std::collections::HashMap;

use popout_windows::WindowTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MenuAction {
    PopupThisTab,
    OpenLinkInPopup,
    MergePopup,
    RememberSize,
}

/// Where the host offers a menu item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuContext {
    Tab,
    Page,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visibility {
    Always,
    WhenNotPopup,
    WhenPopup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub action: MenuAction,
    pub title: &'static str,
    pub contexts: Vec<MenuContext>,
    visibility: Visibility,
}

impl MenuItem {
    fn new(action: MenuAction, title: &'static str, context: MenuContext, visibility: Visibility) -> Self {
        Self {
            action,
            title,
            contexts: vec![context],
            visibility,
        }
    }

    /// Whether visibility depends on tracker state.
    pub fn is_dynamic(&self) -> bool {
        self.visibility != Visibility::Always
    }

    pub fn is_visible(&self, tracker: &WindowTracker) -> bool {
        match self.visibility {
            Visibility::Always => true,
            Visibility::WhenNotPopup => !tracker.is_current_window_popup(),
            Visibility::WhenPopup => tracker.is_current_window_popup(),
        }
    }
}

/// Build the menu items. Without tab-strip menus, "Popup This Tab" moves to
/// the page menu and hides inside popups.
pub fn popout_menus(tab_context: bool) -> Vec<MenuItem> {
    let popup_this_tab = if tab_context {
        MenuItem::new(
            MenuAction::PopupThisTab,
            "Popup This Tab",
            MenuContext::Tab,
            Visibility::Always,
        )
    } else {
        MenuItem::new(
            MenuAction::PopupThisTab,
            "Popup This Tab",
            MenuContext::Page,
            Visibility::WhenNotPopup,
        )
    };

    vec![
        popup_this_tab,
        MenuItem::new(
            MenuAction::OpenLinkInPopup,
            "Open Link in Popup",
            MenuContext::Link,
            Visibility::Always,
        ),
        MenuItem::new(
            MenuAction::MergePopup,
            "Merge Popup",
            MenuContext::Page,
            Visibility::WhenPopup,
        ),
        MenuItem::new(
            MenuAction::RememberSize,
            "Remember window size",
            MenuContext::Page,
            Visibility::WhenPopup,
        ),
    ]
}

/// A show/hide transition produced by [`MenuModel::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuChange {
    pub action: MenuAction,
    pub visible: bool,
}

pub struct MenuModel {
    items: Vec<MenuItem>,
    visible: HashMap<MenuAction, bool>,
}

impl MenuModel {
    /// All items start out shown.
    pub fn new(tab_context: bool) -> Self {
        let items = popout_menus(tab_context);
        let visible = items.iter().map(|item| (item.action, true)).collect();
        Self { items, visible }
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn item(&self, action: MenuAction) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.action == action)
    }

    pub fn is_visible(&self, action: MenuAction) -> bool {
        self.visible.get(&action).copied().unwrap_or(false)
    }

    /// Visible items offered in `context`, in menu order.
    pub fn visible_in(&self, context: MenuContext) -> Vec<MenuAction> {
        self.items
            .iter()
            .filter(|item| item.contexts.contains(&context) && self.is_visible(item.action))
            .map(|item| item.action)
            .collect()
    }

    /// Re-evaluate dynamic items against `tracker`, returning only the items
    /// whose visibility changed.
    pub fn refresh(&mut self, tracker: &WindowTracker) -> Vec<MenuChange> {
        let mut changes = Vec::new();
        for item in self.items.iter().filter(|item| item.is_dynamic()) {
            let visible = item.is_visible(tracker);
            let previous = self.visible.insert(item.action, visible);
            if previous != Some(visible) {
                changes.push(MenuChange {
                    action: item.action,
                    visible,
                });
            }
        }
        changes
    }
}
