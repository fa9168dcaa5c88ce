//! Collaborators the engine drives but does not implement.
//!
//! The windowing layer, the view that paints a panel, the plugin loader and
//! the configuration store are all black boxes. The engine talks to them
//! only through these traits, and [`Backend`] bundles one of each.
//!
//! Everything here is called from the shell's single event loop, so the
//! traits only require `Send` (to move into the actor task), not `Sync`.

use berth_core::{DisplayInfo, Edge, Geometry, PanelEntity, PluginId};

use crate::store::ConfigStore;

/// Display enumeration from the windowing layer.
pub trait DisplayServer: Send {
    /// Every display currently connected.
    fn displays(&self) -> Vec<DisplayInfo>;

    /// The primary display. Defaults to the one flagged primary, or the
    /// first display if none is flagged.
    fn primary_display(&self) -> Option<DisplayInfo> {
        let displays = self.displays();
        displays
            .iter()
            .find(|d| d.primary)
            .or_else(|| displays.first())
            .cloned()
    }
}

/// The activity (workspace) service.
pub trait ActivityTracker: Send {
    /// Whether the service is up. Layout loading waits for it.
    fn is_running(&self) -> bool;

    /// The activity the user is currently in.
    fn current_activity(&self) -> Option<String>;
}

/// An on-screen dock view bound to one entity.
pub trait LiveView: Send {
    /// Makes the view visible.
    fn show(&mut self);

    /// Schedules the view's destruction on the windowing side.
    fn destroy_later(&mut self);

    /// Connector name of the display the view is actually on right now.
    /// The windowing layer may have migrated it on its own.
    fn current_display_name(&self) -> Option<String>;

    /// Geometry the view occupies.
    fn bound_geometry(&self) -> Geometry;

    /// Edge the view is docked to.
    fn location(&self) -> Edge;

    /// Moves the view to another edge of its display.
    fn set_location(&mut self, edge: Edge);

    /// Asks the view to re-evaluate which display it should follow.
    fn reconsider_display(&mut self);

    /// Forces the view onto `display`.
    fn set_display_to_follow(&mut self, display: &DisplayInfo);
}

/// Creates views for entities.
pub trait ViewFactory: Send {
    fn create(&mut self, entity: &PanelEntity, target: &DisplayInfo) -> Box<dyn LiveView>;
}

/// Metadata of a resolvable plugin package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMetadata {
    pub id: PluginId,
    pub name: String,
}

/// Resolves plugin packages.
pub trait PluginLoader: Send {
    /// `None` when the package can not be located or loaded.
    fn resolve(&self, plugin: &PluginId) -> Option<PluginMetadata>;
}

/// One of each collaborator.
pub struct Backend {
    pub displays: Box<dyn DisplayServer>,
    pub activities: Box<dyn ActivityTracker>,
    pub views: Box<dyn ViewFactory>,
    pub plugins: Box<dyn PluginLoader>,
    pub store: Box<dyn ConfigStore>,
}
