//! Engine settings.
//!
//! Read from `$XDG_CONFIG_HOME/berth/berth.toml`; a missing file means
//! defaults. Environment variables override the file:
//!
//! - `BERTH_STORE` - path of the persisted shell configuration
//! - `BERTH_DEBOUNCE_MS` - delay before reconciling after a display change

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use berth_core::{PluginId, DEFAULT_APPLETS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default debounce window for display-change bursts.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

pub const STORE_ENV: &str = "BERTH_STORE";
pub const DEBOUNCE_ENV: &str = "BERTH_DEBOUNCE_MS";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Milliseconds to wait after the last display change before a pass.
    pub debounce_ms: u64,
    /// Where the shell configuration is persisted.
    pub store_path: PathBuf,
    /// Applets placed into the default panel.
    pub default_applets: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            store_path: default_store_path(),
            default_applets: DEFAULT_APPLETS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// `$XDG_STATE_HOME/berth/shell.toml`, or `/tmp/berth/shell.toml`.
pub fn default_store_path() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("berth")
        .join("shell.toml")
}

/// `$XDG_CONFIG_HOME/berth/berth.toml`, if a config directory exists.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("berth").join("berth.toml"))
}

impl Settings {
    /// Loads settings from the default location and applies the environment.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = match default_settings_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(settings)
    }

    /// Loads settings from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Applies overrides looked up by variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(store) = lookup(STORE_ENV) {
            self.store_path = PathBuf::from(store);
        }

        if let Some(value) = lookup(DEBOUNCE_ENV) {
            self.debounce_ms = value
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidEnv {
                    var: DEBOUNCE_ENV,
                    value,
                })?;
        }

        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn default_applet_ids(&self) -> Vec<PluginId> {
        self.default_applets.iter().map(PluginId::new).collect()
    }
}
