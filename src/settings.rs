use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use popout_popup::PopupConfig;
use popout_windows::WindowState;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PopoutSettings {
    // Size memory
    #[serde(default = "default_sweep_interval_secs")]
    pub size_sweep_interval_secs: u64,
    #[serde(default = "default_true")]
    pub remember_sizes: bool,

    // Popup windows
    /// Horizontal position of the temporary window used while merging
    #[serde(default = "default_offscreen_left")]
    pub offscreen_left: i32,
    #[serde(default)]
    pub popup_state: Option<WindowState>,
    /// Register "Popup this tab" on the tab strip when the host supports it
    #[serde(default = "default_true")]
    pub tab_context_menus: bool,

    // Storage
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(default)]
    pub diagnostics: bool,
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_offscreen_left() -> i32 {
    9999
}

fn default_profile() -> String {
    "default".to_string()
}

impl Default for PopoutSettings {
    fn default() -> Self {
        Self {
            size_sweep_interval_secs: default_sweep_interval_secs(),
            remember_sizes: true,
            offscreen_left: default_offscreen_left(),
            popup_state: None,
            tab_context_menus: true,
            profile: default_profile(),
            diagnostics: false,
        }
    }
}

impl PopoutSettings {
    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("popout").join("settings.toml"))
    }

    /// Load settings from the default location, or return defaults if the
    /// file is missing or unreadable
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| toml::from_str(&content).map_err(anyhow::Error::from))
        {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("ignoring settings at {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Save settings to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::settings_path().context("no config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn popup_config(&self) -> PopupConfig {
        PopupConfig {
            offscreen_left: self.offscreen_left,
            popup_state: self.popup_state,
            remember_sizes: self.remember_sizes,
            size_sweep_interval: Duration::from_secs(self.size_sweep_interval_secs.max(1)),
        }
    }
}
