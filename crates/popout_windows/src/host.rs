//! Capability set consumed from the host windowing subsystem.

use std::future::Future;

use crate::error::HostResult;
use crate::model::{
    CreateWindowOptions, MoveTarget, Tab, TabId, TabUpdate, Window, WindowId, WindowType,
    WindowUpdate,
};

/// Asynchronous window and tab operations provided by the host.
///
/// Every call may fail because the window or tab it names was closed in the
/// meantime; callers re-validate ids instead of trusting earlier answers.
pub trait WindowHost: Send + Sync + 'static {
    /// Enumerate open windows whose type is in `types`.
    fn get_all_windows(
        &self,
        types: &[WindowType],
    ) -> impl Future<Output = HostResult<Vec<Window>>> + Send;

    fn get_window(&self, id: WindowId) -> impl Future<Output = HostResult<Window>> + Send;

    fn create_window(
        &self,
        options: CreateWindowOptions,
    ) -> impl Future<Output = HostResult<Window>> + Send;

    fn remove_window(&self, id: WindowId) -> impl Future<Output = HostResult<()>> + Send;

    fn move_tab(
        &self,
        tab_id: TabId,
        target: MoveTarget,
    ) -> impl Future<Output = HostResult<Tab>> + Send;

    fn update_window(
        &self,
        id: WindowId,
        update: WindowUpdate,
    ) -> impl Future<Output = HostResult<()>> + Send;

    fn update_tab(&self, id: TabId, update: TabUpdate)
    -> impl Future<Output = HostResult<()>> + Send;

    /// Active tab of the currently focused window, if any.
    fn query_active_tab(&self) -> impl Future<Output = HostResult<Option<Tab>>> + Send;
}

/// Window lifecycle notification delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Created(Window),
    Removed(WindowId),
    /// Focus moved to `WindowId`. The host may name windows that are not
    /// tracked, such as devtools, or none at all.
    FocusChanged(WindowId),
}
