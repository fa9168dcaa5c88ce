//! Display handles and their stable slot identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DomainError, DomainResult};

// ============================================================================
// Display Slot
// ============================================================================

/// Stable integer identifier bound to a display connector name.
///
/// Slots are handed out by the screen registry and persisted, so a monitor
/// plugged into the same connector gets the same slot across sessions.
/// The sentinel [`DisplaySlot::UNASSIGNED`] (`-1`) means "no display"; where
/// a query accepts a slot it also means "use the primary display".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplaySlot(i32);

impl DisplaySlot {
    /// Sentinel for "not placed on any display".
    pub const UNASSIGNED: DisplaySlot = DisplaySlot(-1);

    /// Creates a slot from its raw integer.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw integer.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// True for any slot other than the sentinel.
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 >= 0
    }

    /// Converts the sentinel into `None`.
    pub fn assigned(self) -> Option<DisplaySlot> {
        self.is_assigned().then_some(self)
    }
}

impl Default for DisplaySlot {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl fmt::Display for DisplaySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DisplaySlot {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        s.trim()
            .parse::<i32>()
            .map(Self)
            .map_err(|e| DomainError::ParseError {
                field: "display slot".to_string(),
                reason: format!("{s:?}: {e}"),
            })
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Axis-aligned rectangle in global desktop coordinates.
///
/// `bottom()` and `right()` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn top(&self) -> i32 {
        self.y
    }

    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Moves the top edge to `top`, keeping the bottom edge in place.
    #[must_use]
    pub fn with_top(self, top: i32) -> Self {
        let bottom = self.bottom();
        Self {
            y: top,
            height: (bottom - top).max(0),
            ..self
        }
    }

    /// Moves the bottom edge to `bottom`, keeping the top edge in place.
    #[must_use]
    pub fn with_bottom(self, bottom: i32) -> Self {
        Self {
            height: (bottom - self.y).max(0),
            ..self
        }
    }

    /// True when the rectangle has no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

// ============================================================================
// Display Info
// ============================================================================

/// Snapshot of a physical monitor as reported by the windowing layer.
///
/// The engine never owns displays; it only observes these snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    /// Hardware connector name (e.g. "DP-1", "HDMI-A-1").
    pub connector: String,
    /// Current geometry in desktop coordinates.
    pub geometry: Geometry,
    /// Whether the windowing layer reports this display as primary.
    #[serde(default)]
    pub primary: bool,
}

impl DisplayInfo {
    pub fn new(connector: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            connector: connector.into(),
            geometry,
            primary: false,
        }
    }

    /// Marks this display as the primary one.
    #[must_use]
    pub fn as_primary(mut self) -> Self {
        self.primary = true;
        self
    }
}
