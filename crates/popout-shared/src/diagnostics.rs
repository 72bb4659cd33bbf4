//! Structured popup/tracker event log.
//!
//! Events are rendered as `name key=value ...` and always reach the `log`
//! facade at debug level. When enabled (`POPOUT_DIAG` or [`set_enabled`]),
//! they are also appended with a timestamp to `<data_dir>/logs/diagnostics.log`.

use std::fmt::Display;
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::paths;

const DIAG_ENV: &str = "POPOUT_DIAG";

const UNSET: u8 = 0;
const OFF: u8 = 1;
const ON: u8 = 2;

static STATE: AtomicU8 = AtomicU8::new(UNSET);

/// Override the `POPOUT_DIAG` environment switch.
pub fn set_enabled(enabled: bool) {
    STATE.store(if enabled { ON } else { OFF }, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    match STATE.load(Ordering::Relaxed) {
        ON => true,
        OFF => false,
        _ => {
            let enabled = std::env::var(DIAG_ENV).is_ok_and(|v| env_flag(&v));
            // A concurrent set_enabled wins over the environment.
            let _ = STATE.compare_exchange(
                UNSET,
                if enabled { ON } else { OFF },
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
            STATE.load(Ordering::Relaxed) == ON
        }
    }
}

fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn log_dir() -> Option<PathBuf> {
    paths::get_log_dir().ok()
}

fn log_file() -> Option<&'static PathBuf> {
    static PATH: OnceLock<Option<PathBuf>> = OnceLock::new();
    PATH.get_or_init(|| log_dir().map(|dir| dir.join("diagnostics.log")))
        .as_ref()
}

/// Record event `name` with its fields, e.g.
/// `event("popup_created", &[("window", &id), ("parent", &parent)])`.
pub fn event(name: &str, fields: &[(&str, &dyn Display)]) {
    log(format_event(name, fields));
}

/// Record a preformatted `name key=value` line.
pub fn log(message: impl AsRef<str>) {
    let message = message.as_ref();
    log::debug!(target: "popout::diag", "{}", message);

    if !is_enabled() {
        return;
    }
    let Some(path) = log_file() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = create_dir_all(parent);
    }
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(timestamped(message).as_bytes());
    }
}

/// Render `name key=value ...`. Values that are empty or contain
/// whitespace, `=` or quotes are written as quoted strings.
pub fn format_event(name: &str, fields: &[(&str, &dyn Display)]) -> String {
    let mut line = name.to_string();
    for (key, value) in fields {
        let value = value.to_string();
        let needs_quotes = value.is_empty()
            || value
                .chars()
                .any(|c| c.is_whitespace() || c == '=' || c == '"');
        if needs_quotes {
            line.push_str(&format!(" {}={:?}", key, value));
        } else {
            line.push_str(&format!(" {}={}", key, value));
        }
    }
    line
}

fn timestamped(message: &str) -> String {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown-time".to_string());
    format!("[{}] {}\n", timestamp, message)
}
