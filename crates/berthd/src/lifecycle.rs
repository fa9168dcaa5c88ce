//! View lifecycle - owns the entity -> live view tables.
//!
//! Every entity is in exactly one of these states:
//!
//! ```text
//!              attach                destroyed = true
//! Unattached ──────────▶ Attached ─────────────────────▶ Quarantined
//!     ▲                    │  ▲      destroyed = false        │
//!     │      detach        │  └───────────────────────────────┤
//!     └────────────────────┘                                  │ finalize
//!                                                             ▼
//!                                                          Removed
//! ```
//!
//! Quarantine exists for two-phase destruction: an entity first reports
//! itself destroyed while its resources linger, and the destruction can
//! still be undone. The view is kept alive but is no longer reconciled.
//!
//! The active and quarantine tables are disjoint. Only the methods here
//! move views between them.

use std::collections::BTreeMap;

use berth_core::{DisplayInfo, EntityId, PanelEntity};
use tracing::{debug, info, warn};

use crate::backend::{LiveView, PluginLoader, ViewFactory};
use crate::error::ShellError;

/// Lifecycle state of an entity's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Unattached,
    Attached,
    Quarantined,
}

/// Result of a successful attach request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// A new view was created and shown.
    Attached,
    /// The entity already had a view; nothing changed.
    AlreadyAttached,
}

/// A live view and the connector it was created for.
struct BoundView {
    view: Box<dyn LiveView>,
    connector: String,
}

/// Owner of every live view.
#[derive(Default)]
pub struct ViewLifecycle {
    active: BTreeMap<EntityId, BoundView>,
    quarantine: BTreeMap<EntityId, BoundView>,
}

impl ViewLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates, shows and records a view for `entity` on `target`.
    ///
    /// # Errors
    ///
    /// - `ShellError::InvalidPlugin` if the entity's package does not resolve
    /// - `ShellError::ReservedPlugin` if the entity is a reserved internal type
    pub fn attach(
        &mut self,
        entity: &PanelEntity,
        target: &DisplayInfo,
        plugins: &dyn PluginLoader,
        factory: &mut dyn ViewFactory,
    ) -> Result<AttachOutcome, ShellError> {
        if plugins.resolve(&entity.plugin).is_none() {
            warn!(
                entity = %entity.id,
                plugin = %entity.plugin,
                "The requested containment plugin can not be located or loaded"
            );
            return Err(ShellError::InvalidPlugin {
                entity: entity.id,
                plugin: entity.plugin.clone(),
            });
        }

        if entity.plugin.is_foreign_reserved() {
            debug!(
                entity = %entity.id,
                plugin = %entity.plugin,
                "Refusing view for reserved containment type"
            );
            return Err(ShellError::ReservedPlugin {
                entity: entity.id,
                plugin: entity.plugin.clone(),
            });
        }

        if self.state(entity.id) != ViewState::Unattached {
            debug!(entity = %entity.id, "Entity already has a view");
            return Ok(AttachOutcome::AlreadyAttached);
        }

        let mut view = factory.create(entity, target);
        view.show();
        self.active.insert(
            entity.id,
            BoundView {
                view,
                connector: target.connector.clone(),
            },
        );

        info!(
            entity = %entity.id,
            connector = %target.connector,
            edge = %entity.location,
            total_views = self.active.len(),
            "View attached"
        );
        Ok(AttachOutcome::Attached)
    }

    /// Moves an attached view into quarantine. Returns `false` if the
    /// entity had no active view.
    pub fn quarantine(&mut self, entity: EntityId) -> bool {
        match self.active.remove(&entity) {
            Some(bound) => {
                self.quarantine.insert(entity, bound);
                debug!(entity = %entity, "View quarantined");
                true
            }
            None => false,
        }
    }

    /// Moves a quarantined view back to the active table unchanged.
    pub fn restore(&mut self, entity: EntityId) -> bool {
        match self.quarantine.remove(&entity) {
            Some(bound) => {
                self.active.insert(entity, bound);
                debug!(entity = %entity, "View restored from quarantine");
                true
            }
            None => false,
        }
    }

    /// Releases the view of a finally destroyed entity.
    ///
    /// Normally the view is in quarantine by now; an entity destroyed
    /// without the two-phase notice still has its active view released.
    pub fn finalize(&mut self, entity: EntityId) -> bool {
        let bound = self
            .quarantine
            .remove(&entity)
            .or_else(|| self.active.remove(&entity));

        match bound {
            Some(mut bound) => {
                bound.view.destroy_later();
                info!(entity = %entity, "View released");
                true
            }
            None => false,
        }
    }

    /// Destroys the active view of `entity`, leaving it unattached.
    pub fn detach(&mut self, entity: EntityId) -> bool {
        match self.active.remove(&entity) {
            Some(mut bound) => {
                bound.view.destroy_later();
                info!(
                    entity = %entity,
                    connector = %bound.connector,
                    total_views = self.active.len(),
                    "View detached"
                );
                true
            }
            None => false,
        }
    }

    /// Tears down the entity's view and recreates it on `target`.
    ///
    /// The old view is destroyed before the new one exists, so no view is
    /// ever left bound to the stale display. Returns `false` if the entity
    /// had no active view.
    pub fn detach_for_reassignment(
        &mut self,
        entity: &PanelEntity,
        target: &DisplayInfo,
        factory: &mut dyn ViewFactory,
    ) -> bool {
        let Some(mut old) = self.active.remove(&entity.id) else {
            return false;
        };
        old.view.destroy_later();

        let mut view = factory.create(entity, target);
        view.show();
        self.active.insert(
            entity.id,
            BoundView {
                view,
                connector: target.connector.clone(),
            },
        );

        info!(
            entity = %entity.id,
            from = %old.connector,
            to = %target.connector,
            "View reassigned"
        );
        true
    }

    pub fn state(&self, entity: EntityId) -> ViewState {
        if self.active.contains_key(&entity) {
            ViewState::Attached
        } else if self.quarantine.contains_key(&entity) {
            ViewState::Quarantined
        } else {
            ViewState::Unattached
        }
    }

    /// The active view of an entity.
    pub fn view(&self, entity: EntityId) -> Option<&dyn LiveView> {
        self.active.get(&entity).map(|b| b.view.as_ref())
    }

    pub fn view_mut(&mut self, entity: EntityId) -> Option<&mut (dyn LiveView + 'static)> {
        self.active.get_mut(&entity).map(|b| b.view.as_mut())
    }

    /// Snapshot of the entities with an active view, in id order.
    ///
    /// Reconciliation iterates this snapshot rather than the table itself,
    /// so the table can change underneath without disturbing the pass.
    pub fn active_ids(&self) -> Vec<EntityId> {
        self.active.keys().copied().collect()
    }

    /// Active views in entity id order.
    pub fn active_views(&self) -> impl Iterator<Item = (EntityId, &dyn LiveView)> {
        self.active.iter().map(|(id, b)| (*id, b.view.as_ref()))
    }

    /// Snapshot of the quarantined entities, in id order.
    pub fn quarantined_ids(&self) -> Vec<EntityId> {
        self.quarantine.keys().copied().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn quarantined_count(&self) -> usize {
        self.quarantine.len()
    }

    /// Destroys every view, active and quarantined.
    pub fn release_all(&mut self) {
        let released = self.active.len() + self.quarantine.len();
        for (_, mut bound) in std::mem::take(&mut self.active) {
            bound.view.destroy_later();
        }
        for (_, mut bound) in std::mem::take(&mut self.quarantine) {
            bound.view.destroy_later();
        }
        debug!(released, "All views released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{Geometry, PanelKind, PluginId};

    use crate::sim::{SimDisplays, SimPlugins, SimViews};

    fn display(connector: &str) -> DisplayInfo {
        DisplayInfo::new(connector, Geometry::new(0, 0, 1920, 1080))
    }

    fn setup() -> (ViewLifecycle, SimPlugins, SimViews) {
        let displays = SimDisplays::new(vec![display("DP-1").as_primary()]);
        (ViewLifecycle::new(), SimPlugins::with_defaults(), SimViews::new(displays))
    }

    #[test]
    fn test_attach_creates_visible_view() {
        let (mut lifecycle, plugins, mut views) = setup();
        let entity = PanelEntity::panel(EntityId::new(1));

        let outcome = lifecycle
            .attach(&entity, &display("DP-1"), &plugins, &mut views)
            .unwrap();

        assert_eq!(outcome, AttachOutcome::Attached);
        assert_eq!(lifecycle.state(entity.id), ViewState::Attached);
        let live = views.live_views();
        assert_eq!(live.len(), 1);
        assert!(live[0].visible);
        assert_eq!(live[0].display.as_deref(), Some("DP-1"));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let (mut lifecycle, plugins, mut views) = setup();
        let entity = PanelEntity::panel(EntityId::new(1));

        lifecycle
            .attach(&entity, &display("DP-1"), &plugins, &mut views)
            .unwrap();
        let second = lifecycle
            .attach(&entity, &display("DP-1"), &plugins, &mut views)
            .unwrap();

        assert_eq!(second, AttachOutcome::AlreadyAttached);
        assert_eq!(lifecycle.active_count(), 1);
        assert_eq!(views.created_count(), 1);
    }

    #[test]
    fn test_attach_invalid_plugin() {
        let (mut lifecycle, plugins, mut views) = setup();
        let entity = PanelEntity::new(
            EntityId::new(2),
            PluginId::from("does.not.exist"),
            PanelKind::Panel,
        );

        let result = lifecycle.attach(&entity, &display("DP-1"), &plugins, &mut views);

        assert!(matches!(result, Err(ShellError::InvalidPlugin { .. })));
        assert_eq!(lifecycle.state(entity.id), ViewState::Unattached);
        assert_eq!(views.created_count(), 0);
    }

    #[test]
    fn test_attach_refuses_reserved_plugin() {
        let (mut lifecycle, plugins, mut views) = setup();
        let entity = PanelEntity::new(
            EntityId::new(3),
            PluginId::from("berth.private.systemtray"),
            PanelKind::Embedded,
        );

        let result = lifecycle.attach(&entity, &display("DP-1"), &plugins, &mut views);

        assert!(matches!(result, Err(ShellError::ReservedPlugin { .. })));
        assert_eq!(views.created_count(), 0);
    }

    #[test]
    fn test_two_phase_destroy_round_trip() {
        let (mut lifecycle, plugins, mut views) = setup();
        let entity = PanelEntity::panel(EntityId::new(1));
        lifecycle
            .attach(&entity, &display("DP-1"), &plugins, &mut views)
            .unwrap();

        assert!(lifecycle.quarantine(entity.id));
        assert_eq!(lifecycle.state(entity.id), ViewState::Quarantined);
        assert_eq!(lifecycle.active_count(), 0);
        assert_eq!(lifecycle.quarantined_count(), 1);

        // Attach while quarantined does not create a second view
        let outcome = lifecycle
            .attach(&entity, &display("DP-1"), &plugins, &mut views)
            .unwrap();
        assert_eq!(outcome, AttachOutcome::AlreadyAttached);

        assert!(lifecycle.restore(entity.id));
        assert_eq!(lifecycle.state(entity.id), ViewState::Attached);
        assert_eq!(lifecycle.quarantined_count(), 0);
        assert_eq!(views.created_count(), 1);
        assert_eq!(views.live_views().len(), 1);
    }

    #[test]
    fn test_finalize_releases_quarantined_view() {
        let (mut lifecycle, plugins, mut views) = setup();
        let entity = PanelEntity::panel(EntityId::new(1));
        lifecycle
            .attach(&entity, &display("DP-1"), &plugins, &mut views)
            .unwrap();
        lifecycle.quarantine(entity.id);

        assert!(lifecycle.finalize(entity.id));
        assert_eq!(lifecycle.state(entity.id), ViewState::Unattached);
        assert!(views.live_views().is_empty());
        assert!(!lifecycle.finalize(entity.id));
    }

    #[test]
    fn test_restore_without_quarantine_is_noop() {
        let (mut lifecycle, _, _) = setup();
        assert!(!lifecycle.restore(EntityId::new(5)));
        assert!(!lifecycle.quarantine(EntityId::new(5)));
    }

    #[test]
    fn test_detach_for_reassignment_recreates_view() {
        let (mut lifecycle, plugins, mut views) = setup();
        let entity = PanelEntity::panel(EntityId::new(1));
        lifecycle
            .attach(&entity, &display("DP-1"), &plugins, &mut views)
            .unwrap();

        assert!(lifecycle.detach_for_reassignment(&entity, &display("DP-2"), &mut views));

        let live = views.live_views();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].display.as_deref(), Some("DP-2"));
        assert_eq!(views.created_count(), 2);
        assert_eq!(lifecycle.active_count(), 1);
    }

    #[test]
    fn test_release_all() {
        let (mut lifecycle, plugins, mut views) = setup();
        for id in 1..=3 {
            let entity = PanelEntity::panel(EntityId::new(id));
            lifecycle
                .attach(&entity, &display("DP-1"), &plugins, &mut views)
                .unwrap();
        }
        lifecycle.quarantine(EntityId::new(2));

        lifecycle.release_all();
        assert_eq!(lifecycle.active_count(), 0);
        assert_eq!(lifecycle.quarantined_count(), 0);
        assert!(views.live_views().is_empty());
    }
}
