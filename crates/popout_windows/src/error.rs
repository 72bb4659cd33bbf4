use thiserror::Error;

use crate::model::{TabId, WindowId};

/// Failure reported by the host windowing subsystem.
///
/// Most of these come from races with the user closing windows while an
/// operation is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("no window with id {0}")]
    NoSuchWindow(WindowId),
    #[error("no tab with id {0}")]
    NoSuchTab(TabId),
    #[error("host rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
    #[error("host disconnected")]
    Disconnected,
}

impl HostError {
    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        HostError::Rejected {
            operation,
            message: message.into(),
        }
    }

    /// True when the failure means the addressed window is gone.
    pub fn is_missing_window(&self) -> bool {
        matches!(self, HostError::NoSuchWindow(_))
    }
}

pub type HostResult<T> = Result<T, HostError>;
