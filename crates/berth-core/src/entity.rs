//! Persisted panel entities (containments) and their applets.
//!
//! A [`PanelEntity`] is an inert configuration record. It never holds the
//! on-screen view; the lifecycle manager relates the two through a lookup
//! table keyed by [`EntityId`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DisplaySlot, Edge, PluginId};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier of a persisted panel entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u32);

impl EntityId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an applet, unique within its containing entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppletId(u32);

impl AppletId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AppletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Panel Kind
// ============================================================================

/// What sort of containment an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    /// Ordinary dock/panel.
    #[default]
    Panel,
    /// Panel with a custom layout; placed like an ordinary panel.
    CustomPanel,
    /// Containment hosted inside another one (e.g. a system tray).
    /// Scoped to an activity rather than always shown.
    Embedded,
}

impl PanelKind {
    /// Panel-type entities are shown regardless of the current activity.
    #[must_use]
    pub fn is_panel_type(self) -> bool {
        matches!(self, PanelKind::Panel | PanelKind::CustomPanel)
    }
}

// ============================================================================
// Applet
// ============================================================================

/// A content item living inside a panel entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applet {
    pub id: AppletId,
    pub plugin: PluginId,
}

// ============================================================================
// Panel Entity
// ============================================================================

/// Persisted configuration record for one panel/dock instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelEntity {
    pub id: EntityId,
    pub plugin: PluginId,
    #[serde(default)]
    pub kind: PanelKind,
    /// Requested edge.
    #[serde(default)]
    pub location: Edge,
    /// Display slot the entity is currently assigned to.
    #[serde(default)]
    pub screen: DisplaySlot,
    /// Last display slot the entity was placed on. Survives the display
    /// going away, so the entity can return when it comes back.
    #[serde(default)]
    pub last_screen: DisplaySlot,
    /// Activity (workspace) the entity is scoped to, if any.
    #[serde(default)]
    pub activity: Option<String>,
    /// Hosting entity for nested containments.
    #[serde(default)]
    pub parent: Option<EntityId>,
    /// Whether the default-layout setup has completed for this entity.
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub applets: Vec<Applet>,
    /// Logically destroyed but not yet finalized. Never persisted.
    #[serde(skip)]
    pub destroyed: bool,
}

impl PanelEntity {
    /// Creates an unplaced entity.
    pub fn new(id: EntityId, plugin: PluginId, kind: PanelKind) -> Self {
        Self {
            id,
            plugin,
            kind,
            location: Edge::default(),
            screen: DisplaySlot::UNASSIGNED,
            last_screen: DisplaySlot::UNASSIGNED,
            activity: None,
            parent: None,
            initialized: false,
            applets: Vec::new(),
            destroyed: false,
        }
    }

    /// Creates an ordinary panel of the shell's own type.
    pub fn panel(id: EntityId) -> Self {
        Self::new(id, PluginId::shell_panel(), PanelKind::Panel)
    }

    #[must_use]
    pub fn with_location(mut self, location: Edge) -> Self {
        self.location = location;
        self
    }

    /// Sets both the assigned and the last-known slot.
    #[must_use]
    pub fn on_screen(mut self, slot: DisplaySlot) -> Self {
        self.set_screen(slot);
        self
    }

    #[must_use]
    pub fn with_last_screen(mut self, slot: DisplaySlot) -> Self {
        self.last_screen = slot;
        self
    }

    #[must_use]
    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// True when the entity is placed regardless of the current activity.
    #[must_use]
    pub fn is_panel_type(&self) -> bool {
        self.kind.is_panel_type()
    }

    /// Slot used when placing a new view: the assigned slot, or the
    /// last-known one when unassigned.
    pub fn placement_slot(&self) -> DisplaySlot {
        if self.screen.is_assigned() {
            self.screen
        } else {
            self.last_screen
        }
    }

    /// Assigns the entity to `slot`. The last-known slot follows unless
    /// the entity is being unassigned.
    pub fn set_screen(&mut self, slot: DisplaySlot) {
        self.screen = slot;
        if slot.is_assigned() {
            self.last_screen = slot;
        }
    }

    /// Adds an applet and returns its new id.
    pub fn add_applet(&mut self, plugin: PluginId) -> AppletId {
        let next = self
            .applets
            .iter()
            .map(|a| a.id.get() + 1)
            .max()
            .unwrap_or(1);
        let id = AppletId::new(next);
        self.applets.push(Applet { id, plugin });
        id
    }

    /// Removes an applet, returning whether it existed.
    pub fn remove_applet(&mut self, applet: AppletId) -> bool {
        let before = self.applets.len();
        self.applets.retain(|a| a.id != applet);
        self.applets.len() != before
    }

    #[must_use]
    pub fn has_applet(&self, applet: AppletId) -> bool {
        self.applets.iter().any(|a| a.id == applet)
    }
}
