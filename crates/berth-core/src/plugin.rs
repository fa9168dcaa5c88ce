//! Plugin identifiers the engine treats specially.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a containment or applet package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

/// The shell's own panel containment type.
pub const SHELL_PANEL_PLUGIN: &str = "berth.panel";

/// Internal containment types that must never get a dock view of their own.
pub const RESERVED_PLUGINS: &[&str] = &["berth.private.systemtray"];

/// Applets placed into the panel created by the default layout.
pub const DEFAULT_APPLETS: &[&str] = &["berth.tasks", "berth.clock"];

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The shell's own panel type.
    pub fn shell_panel() -> Self {
        Self::new(SHELL_PANEL_PLUGIN)
    }

    /// True for reserved internal types, except the shell's own panel type.
    #[must_use]
    pub fn is_foreign_reserved(&self) -> bool {
        self.0 != SHELL_PANEL_PLUGIN && RESERVED_PLUGINS.contains(&self.0.as_str())
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
