//! Popout runtime.
//!
//! Wires the window tracker, the popup store, menu visibility and command
//! dispatch into one service that a host adapter drives:
//!
//! ```rust,ignore
//! popout::init_logging();
//! let settings = PopoutSettings::load();
//! let mut popout = Popout::with_profile_storage(host, &settings)?;
//! let mut menu_changes = popout.start().await;
//! tokio::spawn(async move { popout.run_events(host_events).await });
//! ```

pub mod commands;
pub mod menus;
pub mod settings;

pub use commands::Command;
pub use menus::{MenuAction, MenuChange, MenuContext, MenuItem, MenuModel};
pub use settings::PopoutSettings;

use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use popout_popup::{FileStorage, KeyValueStorage, PopupStore};
use popout_shared::diagnostics;
use popout_windows::{HostEvent, SubscriptionId, Tab, TrackerEvent, WindowHost, WindowTracker};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Install the `env_logger` backend for the `log` facade. Safe to call more
/// than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

pub struct Popout<H, S> {
    host: Arc<H>,
    tracker: WindowTracker,
    store: Arc<PopupStore<H, S>>,
    menus: Arc<Mutex<MenuModel>>,
    menu_subscription: Option<SubscriptionId>,
    sweep: Option<JoinHandle<()>>,
}

impl<H: WindowHost> Popout<H, FileStorage> {
    /// Runtime backed by the on-disk storage of the configured profile.
    pub fn with_profile_storage(host: Arc<H>, settings: &PopoutSettings) -> anyhow::Result<Self> {
        let storage = FileStorage::open_profile(&settings.profile)
            .with_context(|| format!("opening storage for profile {}", settings.profile))?;
        Ok(Self::new(host, Arc::new(storage), settings))
    }
}

impl<H: WindowHost, S: KeyValueStorage> Popout<H, S> {
    pub fn new(host: Arc<H>, storage: Arc<S>, settings: &PopoutSettings) -> Self {
        if settings.diagnostics {
            diagnostics::set_enabled(true);
        }
        let tracker = WindowTracker::new();
        let store = Arc::new(PopupStore::new(
            host.clone(),
            storage,
            tracker.clone(),
            settings.popup_config(),
        ));

        Self {
            host,
            tracker,
            store,
            menus: Arc::new(Mutex::new(MenuModel::new(settings.tab_context_menus))),
            menu_subscription: None,
            sweep: None,
        }
    }

    pub fn tracker(&self) -> &WindowTracker {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<PopupStore<H, S>> {
        &self.store
    }

    pub fn is_menu_visible(&self, action: MenuAction) -> bool {
        self.menus.lock().is_visible(action)
    }

    pub fn visible_menu_items(&self, context: MenuContext) -> Vec<MenuAction> {
        self.menus.lock().visible_in(context)
    }

    pub fn is_started(&self) -> bool {
        self.menu_subscription.is_some()
    }

    /// Enumerate windows, begin refreshing menus on readiness and focus
    /// changes, and start the size sweep.
    ///
    /// Menu show/hide transitions are delivered on the returned channel.
    pub async fn start(&mut self) -> mpsc::UnboundedReceiver<MenuChange> {
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        let menus = self.menus.clone();
        let tracker = self.tracker.clone();
        let on_event = tx.clone();
        self.menu_subscription = Some(self.tracker.subscribe(move |event| {
            if !matches!(event, TrackerEvent::Ready | TrackerEvent::FocusChanged(_)) {
                return;
            }
            let changes = menus.lock().refresh(&tracker);
            for change in changes {
                let _ = on_event.send(change);
            }
        }));

        self.tracker.initialize(self.host.as_ref()).await;
        // Ready fires once per tracker, so a restart catches up on focus
        // changes seen while stopped here.
        let changes = self.menus.lock().refresh(&self.tracker);
        for change in changes {
            let _ = tx.send(change);
        }
        self.sweep = Some(self.store.spawn_size_sweep());
        diagnostics::event("popout_started", &[("windows", &self.tracker.len())]);
        rx
    }

    pub fn handle_host_event(&self, event: HostEvent) {
        self.tracker.handle_host_event(event);
    }

    /// Feed host notifications into the tracker until the sender closes.
    pub async fn run_events(&self, mut events: mpsc::UnboundedReceiver<HostEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_host_event(event);
        }
        log::debug!("host event stream closed");
    }

    /// Run the operation behind a clicked menu item. Failures are logged.
    pub async fn handle_menu_click(&self, action: MenuAction, tab: &Tab, link_url: Option<&str>) {
        let result = match action {
            MenuAction::PopupThisTab => self.store.create_popup(tab).await.map(drop),
            MenuAction::OpenLinkInPopup => {
                let Some(url) = link_url else {
                    log::warn!("link menu clicked without a link url");
                    return;
                };
                self.store.create_popup_from_url(tab, url).await.map(drop)
            }
            MenuAction::MergePopup => self.store.merge_popup(tab).await.map(drop),
            MenuAction::RememberSize => self.store.save_size(tab).await.map(drop),
        };
        if let Err(err) = result {
            log::warn!("{:?} failed for tab {}: {}", action, tab.id, err);
        }
    }

    /// Dispatch a named keyboard command. Unknown names are ignored.
    pub async fn handle_command(&self, name: &str) {
        let Some(command) = Command::parse(name) else {
            log::debug!("ignoring unknown command {}", name);
            return;
        };
        match command {
            Command::PopupTab => self.toggle_active_tab().await,
        }
    }

    async fn toggle_active_tab(&self) {
        let tab = match self.host.query_active_tab().await {
            Ok(Some(tab)) => tab,
            Ok(None) => return,
            Err(err) => {
                log::warn!("active tab query failed: {}", err);
                return;
            }
        };
        let action = if self.tracker.is_current_window_popup() {
            MenuAction::MergePopup
        } else {
            MenuAction::PopupThisTab
        };
        self.handle_menu_click(action, &tab, None).await;
    }
}

impl<H, S> Popout<H, S> {
    /// Stop the size sweep and menu refreshes. Tracked state is kept.
    pub fn stop(&mut self) {
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
        }
        if let Some(id) = self.menu_subscription.take() {
            self.tracker.events().unsubscribe(id);
        }
    }
}

impl<H, S> Drop for Popout<H, S> {
    fn drop(&mut self) {
        self.stop();
    }
}
