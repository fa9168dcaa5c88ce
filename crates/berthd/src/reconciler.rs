//! Topology reconciler - keeps dock views in step with the display set.
//!
//! The reconciler is the single owner of the shell's placement state: the
//! panel entities, the screen registry and the view lifecycle tables. It is
//! driven by one event loop (see [`crate::shell`]) and never runs two
//! passes at once.
//!
//! # Re-entrancy
//!
//! Creating or destroying a view can make the windowing layer emit further
//! notifications. Those arrive as new commands on the event loop, never in
//! the middle of a pass, and every pass iterates a snapshot of entity ids
//! taken before it starts mutating the tables.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Every error of the placement taxonomy is logged and degraded around

use std::collections::{BTreeMap, HashSet};

use berth_core::{
    AppletId, DisplayInfo, DisplaySlot, Edge, EntityId, Geometry, PanelEntity, PluginId,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::edges;
use crate::error::ShellError;
use crate::lifecycle::{AttachOutcome, ViewLifecycle, ViewState};
use crate::screens::ScreenRegistry;
use crate::shell::ShellEvent;
use crate::store::StoreError;

/// Deepest parent chain followed when resolving a nested entity's display.
pub const MAX_NESTING_DEPTH: usize = 8;

// ============================================================================
// Reports and Snapshots
// ============================================================================

/// What one topology pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entities that got a new view.
    pub attached: Vec<EntityId>,
    /// Entities whose view was destroyed because its display is gone.
    pub removed: Vec<EntityId>,
    /// Entities kept alive by last-view protection and sent to the primary.
    pub redirected: Vec<EntityId>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.removed.is_empty() && self.redirected.is_empty()
    }
}

/// A display as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySummary {
    pub connector: String,
    pub slot: Option<DisplaySlot>,
    pub primary: bool,
    pub geometry: Geometry,
}

/// An active view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewSummary {
    pub entity: EntityId,
    pub connector: Option<String>,
    pub edge: Edge,
}

/// Read-only copy of the reconciler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellSnapshot {
    pub displays: Vec<DisplaySummary>,
    pub views: Vec<ViewSummary>,
    pub quarantined: Vec<EntityId>,
    pub entities: Vec<PanelEntity>,
}

impl ShellSnapshot {
    /// The active view of `entity`, if any.
    pub fn view_of(&self, entity: EntityId) -> Option<&ViewSummary> {
        self.views.iter().find(|v| v.entity == entity)
    }

    pub fn entity(&self, entity: EntityId) -> Option<&PanelEntity> {
        self.entities.iter().find(|e| e.id == entity)
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Owner of all placement state.
pub struct Reconciler {
    backend: Backend,
    screens: ScreenRegistry,
    lifecycle: ViewLifecycle,
    entities: BTreeMap<EntityId, PanelEntity>,
    events: broadcast::Sender<ShellEvent>,
    default_applets: Vec<PluginId>,
    loaded: bool,
}

impl Reconciler {
    /// Creates a reconciler.
    ///
    /// Persisted screen bindings are read right away, so slots handed out
    /// before the layout load never collide with them. Entities wait for
    /// [`Reconciler::load`].
    pub fn new(
        backend: Backend,
        events: broadcast::Sender<ShellEvent>,
        default_applets: Vec<PluginId>,
    ) -> Self {
        let mut screens = ScreenRegistry::new();
        screens.load(backend.store.as_ref());

        Self {
            backend,
            screens,
            lifecycle: ViewLifecycle::new(),
            entities: BTreeMap::new(),
            events,
            default_applets,
            loaded: false,
        }
    }

    fn emit(&self, event: ShellEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_dock_count(&self) {
        self.emit(ShellEvent::DockCountChanged {
            count: self.lifecycle.active_count(),
        });
    }

    /// Writes one entity to the store and syncs.
    fn persist(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        self.backend.store.write_containment(entity);
        if let Err(e) = self.backend.store.sync() {
            warn!(entity = %id, error = %e, "Failed to persist entity");
        }
    }

    fn log_outcome(id: EntityId, result: &Result<AttachOutcome, ShellError>) {
        match result {
            Ok(AttachOutcome::Attached) => {}
            Ok(AttachOutcome::AlreadyAttached) => {
                debug!(entity = %id, "Attach skipped, view exists");
            }
            Err(e @ ShellError::UnresolvedTarget(_)) => {
                debug!(entity = %id, error = %e, "Entity left unattached until next topology change");
            }
            Err(e) => warn!(entity = %id, error = %e, "Attach failed"),
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Loads the persisted layout, once.
    ///
    /// Does nothing until the activity service is running. Restores every
    /// persisted entity and attaches those that resolve to a display; with
    /// no persisted entities the default layout is created instead.
    /// Returns `true` if this call performed the load.
    pub fn load(&mut self) -> bool {
        if self.loaded {
            return false;
        }
        if !self.backend.activities.is_running() {
            debug!("Activity service not running, deferring layout load");
            return false;
        }
        self.loaded = true;

        self.refresh_primary();
        for display in self.backend.displays.displays() {
            self.screens
                .slot_for(&display.connector, self.backend.store.as_mut());
        }

        let restored: Vec<PanelEntity> = self
            .backend
            .store
            .containment_groups()
            .into_iter()
            .filter_map(|id| self.backend.store.read_containment(id))
            .collect();

        info!(entities = restored.len(), "Loading layout");

        if restored.is_empty() {
            if let Err(e) = self.load_default_layout() {
                warn!(error = %e, "Failed to create default layout");
            }
            return true;
        }

        for mut entity in restored {
            if entity.screen.is_assigned() && !entity.last_screen.is_assigned() {
                entity.last_screen = entity.screen;
            }
            self.entities.insert(entity.id, entity);
        }

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.emit(ShellEvent::EntityAdded { entity: id });
            let result = self.add_dock(id);
            Self::log_outcome(id, &result);
        }

        true
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Creates the single default panel on the primary display.
    ///
    /// The panel goes on the first free edge of the primary display
    /// (Bottom when none is free) and receives the default applets.
    pub fn load_default_layout(&mut self) -> Result<EntityId, ShellError> {
        info!("Loading default layout");

        let id = self.next_entity_id();
        let mut entity = PanelEntity::panel(id);

        if self.backend.plugins.resolve(&entity.plugin).is_none() {
            return Err(ShellError::InvalidPlugin {
                entity: id,
                plugin: entity.plugin,
            });
        }

        entity.location = self
            .free_edges(entity.screen)
            .first()
            .copied()
            .unwrap_or(Edge::Bottom);
        entity.initialized = true;

        self.entities.insert(id, entity);
        self.persist(id);
        self.emit(ShellEvent::EntityAdded { entity: id });

        let result = self.add_dock(id);
        Self::log_outcome(id, &result);

        let applets = self.default_applets.clone();
        if let Some(entity) = self.entities.get_mut(&id) {
            for plugin in applets {
                entity.add_applet(plugin);
            }
        }
        self.persist(id);

        Ok(id)
    }

    fn next_entity_id(&self) -> EntityId {
        let persisted = self.backend.store.containment_groups();
        let max = self
            .entities
            .keys()
            .chain(persisted.iter())
            .map(|id| id.get())
            .max()
            .unwrap_or(0);
        EntityId::new(max + 1)
    }

    // ========================================================================
    // Entity Lifecycle
    // ========================================================================

    /// Registers a new entity from the configuration layer and attaches it.
    pub fn add_entity(&mut self, mut entity: PanelEntity) -> Result<AttachOutcome, ShellError> {
        if entity.screen.is_assigned() && !entity.last_screen.is_assigned() {
            entity.last_screen = entity.screen;
        }
        let id = entity.id;
        self.entities.insert(id, entity);
        self.persist(id);
        self.emit(ShellEvent::EntityAdded { entity: id });

        let result = self.add_dock(id);
        Self::log_outcome(id, &result);
        result
    }

    /// Attaches a view for `id` on whatever display it resolves to.
    ///
    /// An entity that was never placed anywhere goes to the primary display.
    ///
    /// # Errors
    ///
    /// - `ShellError::EntityNotFound` for unknown entities
    /// - `ShellError::NoDisplaysAvailable` when no display is connected
    /// - `ShellError::UnresolvedTarget` when the entity's display is absent
    /// - `ShellError::InvalidPlugin` / `ShellError::ReservedPlugin` from attach
    pub fn add_dock(&mut self, id: EntityId) -> Result<AttachOutcome, ShellError> {
        let entity = self.entities.get(&id).ok_or(ShellError::EntityNotFound(id))?;
        if entity.destroyed {
            return Err(ShellError::UnresolvedTarget(id));
        }
        let never_placed = Self::never_placed(entity);

        let displays = self.backend.displays.displays();
        if displays.is_empty() {
            return Err(ShellError::NoDisplaysAvailable);
        }

        let resolved = self.screen_for_entity(id);
        let target = match resolved.assigned() {
            Some(slot) => self.present_display(slot, &displays),
            None if never_placed => self.backend.displays.primary_display(),
            None => None,
        };
        let target = target.ok_or(ShellError::UnresolvedTarget(id))?;

        self.attach_to(id, &target)
    }

    /// Attaches `id` to `display` and records the display on the entity.
    fn attach_to(&mut self, id: EntityId, display: &DisplayInfo) -> Result<AttachOutcome, ShellError> {
        let entity = self.entities.get(&id).ok_or(ShellError::EntityNotFound(id))?;
        let outcome = self.lifecycle.attach(
            entity,
            display,
            self.backend.plugins.as_ref(),
            self.backend.views.as_mut(),
        )?;

        if outcome == AttachOutcome::Attached {
            let slot = self
                .screens
                .slot_for(&display.connector, self.backend.store.as_mut());
            if let Some(entity) = self.entities.get_mut(&id) {
                if entity.screen != slot {
                    entity.set_screen(slot);
                    self.persist(id);
                }
            }
            self.emit_dock_count();
        }

        Ok(outcome)
    }

    /// First phase of destruction, or its cancellation.
    ///
    /// `destroyed = true` quarantines the entity's view; `false` puts the
    /// quarantined view back unchanged.
    pub fn destroyed_changed(&mut self, id: EntityId, destroyed: bool) {
        let Some(entity) = self.entities.get_mut(&id) else {
            debug!(entity = %id, "Destroyed-state change for unknown entity");
            return;
        };
        entity.destroyed = destroyed;

        let moved = if destroyed {
            self.lifecycle.quarantine(id)
        } else {
            self.lifecycle.restore(id)
        };

        info!(entity = %id, destroyed, moved, "Entity destroyed state changed");
        if moved {
            self.emit_dock_count();
        }
    }

    /// Final destruction: releases the view and forgets the entity.
    ///
    /// The entity's persisted group stays until configuration garbage
    /// collection runs.
    pub fn entity_destroyed(&mut self, id: EntityId) {
        let known = self.entities.remove(&id).is_some();
        let released = self.lifecycle.finalize(id);

        info!(entity = %id, released, "Entity destroyed");
        if known || released {
            self.emit_dock_count();
        }
    }

    /// Records a new requested edge and moves the view there.
    pub fn location_changed(&mut self, id: EntityId, edge: Edge) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if entity.location == edge {
            return;
        }
        entity.location = edge;

        if let Some(view) = self.lifecycle.view_mut(id) {
            view.set_location(edge);
        }
        self.persist(id);

        debug!(entity = %id, edge = %edge, "Dock location changed");
        self.emit(ShellEvent::LocationChanged { entity: id, edge });
    }

    /// Forwards an alternatives request to the picker UI. Requests for
    /// destroyed entities or unknown applets are dropped.
    pub fn alternatives_requested(&mut self, id: EntityId, applet: AppletId) -> bool {
        let wanted = self
            .entities
            .get(&id)
            .is_some_and(|e| !e.destroyed && e.has_applet(applet));

        if wanted {
            self.emit(ShellEvent::AlternativesRequested { entity: id, applet });
        } else {
            debug!(entity = %id, applet = %applet, "Dropping alternatives request");
        }
        wanted
    }

    /// Removes an applet from an entity. Its persisted group lingers until
    /// garbage collection.
    pub fn remove_applet(&mut self, id: EntityId, applet: AppletId) -> Result<bool, ShellError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(ShellError::EntityNotFound(id))?;
        let removed = entity.remove_applet(applet);
        if removed {
            self.persist(id);
        }
        Ok(removed)
    }

    /// Reassigns an entity to another display slot.
    ///
    /// An attached view is recreated on the new display if it is present,
    /// or destroyed if it is not (the entity then waits for that display).
    /// An unattached entity is attached if the new display is present.
    pub fn set_entity_screen(&mut self, id: EntityId, slot: DisplaySlot) -> Result<(), ShellError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(ShellError::EntityNotFound(id))?;
        entity.set_screen(slot);
        self.persist(id);

        match self.lifecycle.state(id) {
            ViewState::Quarantined => Ok(()),
            ViewState::Unattached => {
                let result = self.add_dock(id);
                Self::log_outcome(id, &result);
                Ok(())
            }
            ViewState::Attached => {
                let displays = self.backend.displays.displays();
                let current = self
                    .lifecycle
                    .view(id)
                    .and_then(|v| v.current_display_name());

                match self.present_display(slot, &displays) {
                    Some(target) if current.as_deref() == Some(target.connector.as_str()) => Ok(()),
                    Some(target) => {
                        if let Some(entity) = self.entities.get(&id) {
                            self.lifecycle.detach_for_reassignment(
                                entity,
                                &target,
                                self.backend.views.as_mut(),
                            );
                        }
                        Ok(())
                    }
                    None => {
                        self.lifecycle.detach(id);
                        self.emit_dock_count();
                        Ok(())
                    }
                }
            }
        }
    }

    // ========================================================================
    // Display Resolution
    // ========================================================================

    /// Resolves the display slot an entity belongs on this cycle.
    ///
    /// 1. Nested entities follow their parent.
    /// 2. An existing view's actual display wins.
    /// 3. The last-known slot, if its display is present and the entity is
    ///    panel-type or scoped to the current activity.
    /// 4. Otherwise the sentinel: not placed this cycle.
    pub fn screen_for_entity(&self, id: EntityId) -> DisplaySlot {
        self.resolve_screen(id, 0)
    }

    fn resolve_screen(&self, id: EntityId, depth: usize) -> DisplaySlot {
        let Some(entity) = self.entities.get(&id) else {
            return DisplaySlot::UNASSIGNED;
        };

        if let Some(parent) = entity.parent {
            if depth >= MAX_NESTING_DEPTH {
                warn!(entity = %id, "Entity nesting too deep, leaving unplaced");
                return DisplaySlot::UNASSIGNED;
            }
            return self.resolve_screen(parent, depth + 1);
        }

        let live_slot = self
            .lifecycle
            .view(id)
            .and_then(|view| view.current_display_name())
            .and_then(|connector| self.screens.slot_of(&connector));
        if let Some(slot) = live_slot {
            return slot;
        }

        let last = entity.last_screen;
        if !last.is_assigned() {
            return DisplaySlot::UNASSIGNED;
        }

        let present = self
            .backend
            .displays
            .displays()
            .iter()
            .any(|d| self.screens.slot_of(&d.connector) == Some(last));
        let in_scope =
            entity.is_panel_type() || entity.activity == self.backend.activities.current_activity();

        if present && in_scope {
            last
        } else {
            DisplaySlot::UNASSIGNED
        }
    }

    /// True for a top-level entity with neither an assigned nor a
    /// last-known slot. Such an entity goes to the primary display.
    fn never_placed(entity: &PanelEntity) -> bool {
        !entity.placement_slot().is_assigned() && entity.parent.is_none()
    }

    /// Slot the attach pass places `id` on: the resolved slot, or the
    /// primary one for a never-placed entity.
    fn target_slot(&mut self, id: EntityId) -> DisplaySlot {
        let resolved = self.screen_for_entity(id);
        if resolved.is_assigned() {
            return resolved;
        }
        match self.entities.get(&id) {
            Some(entity) if Self::never_placed(entity) => {
                self.screens.primary_slot(self.backend.store.as_mut())
            }
            _ => resolved,
        }
    }

    /// The connected display bound to `slot`.
    fn present_display(&self, slot: DisplaySlot, displays: &[DisplayInfo]) -> Option<DisplayInfo> {
        let connector = self.screens.connector_for(slot)?;
        displays.iter().find(|d| d.connector == connector).cloned()
    }

    /// Tells the registry which connector is primary now.
    fn refresh_primary(&mut self) -> bool {
        match self.backend.displays.primary_display() {
            Some(primary) => {
                let changed = self.screens.set_primary_connector(&primary.connector);
                self.screens
                    .slot_for(&primary.connector, self.backend.store.as_mut());
                changed
            }
            None => false,
        }
    }

    // ========================================================================
    // Topology Events
    // ========================================================================

    /// A display was plugged in. Binds its slot right away; placement
    /// waits for the debounced pass. Before the layout is loaded the
    /// binding is left to [`Reconciler::load`].
    pub fn display_added(&mut self, output: &DisplayInfo) {
        let connector = output.connector.as_str();
        if !self.loaded {
            debug!(connector, "Display added before layout load");
            return;
        }
        let slot = self.screens.slot_for(connector, self.backend.store.as_mut());
        info!(connector, slot = %slot, "Display added");
    }

    /// A display was unplugged. Placement waits for the debounced pass.
    pub fn display_removed(&mut self, connector: &str) {
        info!(connector, "Display removed");
    }

    /// The primary display changed.
    ///
    /// With exactly one view and one display, the view is forced onto the
    /// new primary unconditionally. Returns `true` if the primary
    /// connector binding changed, in which case a full pass should follow.
    pub fn primary_output_changed(&mut self) -> bool {
        let changed = self.refresh_primary();
        let displays = self.backend.displays.displays();
        let primary = self.backend.displays.primary_display();

        info!(
            primary = ?primary.as_ref().map(|d| d.connector.as_str()),
            displays = displays.len(),
            views = self.lifecycle.active_count(),
            "Primary display changed"
        );

        if self.lifecycle.active_count() == 1 && displays.len() == 1 {
            if let Some(primary) = primary {
                for id in self.lifecycle.active_ids() {
                    self.follow_display(id, &primary);
                }
            }
        }

        changed
    }

    /// Forces the view of `id` onto `display` and records it on the entity.
    fn follow_display(&mut self, id: EntityId, display: &DisplayInfo) {
        if let Some(view) = self.lifecycle.view_mut(id) {
            view.set_display_to_follow(display);
        }
        let slot = self
            .screens
            .slot_for(&display.connector, self.backend.store.as_mut());
        if let Some(entity) = self.entities.get_mut(&id) {
            if entity.screen != slot {
                entity.set_screen(slot);
                self.persist(id);
            }
        }
    }

    /// Full reconciliation pass after the display set changed.
    ///
    /// First every unattached entity whose resolved display is connected
    /// gets a view. Then every view whose display (as the view itself
    /// reports it) is gone is destroyed, unless it is the last view, which
    /// is sent to the primary display instead. Views still on a connected
    /// display are asked to reconsider their display.
    ///
    /// # Errors
    ///
    /// `ShellError::NoDisplaysAvailable` when no display is connected;
    /// nothing is destroyed in that case.
    pub fn reconcile_displays(&mut self) -> Result<ReconcileReport, ShellError> {
        let displays = self.backend.displays.displays();
        if displays.is_empty() {
            warn!("No displays available, deferring reconciliation");
            return Err(ShellError::NoDisplaysAvailable);
        }

        self.refresh_primary();
        for output in &displays {
            self.screens
                .slot_for(&output.connector, self.backend.store.as_mut());
        }

        info!(
            displays = displays.len(),
            views = self.lifecycle.active_count(),
            "Reconciling display topology"
        );

        let mut report = ReconcileReport::default();

        // Attach pass
        let candidates: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| !e.destroyed && self.lifecycle.state(e.id) == ViewState::Unattached)
            .map(|e| e.id)
            .collect();

        for output in &displays {
            for &id in &candidates {
                if self.lifecycle.state(id) != ViewState::Unattached {
                    continue;
                }
                let slot = self.target_slot(id);
                if self.screens.connector_for(slot) != Some(output.connector.as_str()) {
                    continue;
                }

                debug!(entity = %id, connector = %output.connector, "View must be added");
                let result = self.attach_to(id, output);
                if matches!(result, Ok(AttachOutcome::Attached)) {
                    report.attached.push(id);
                }
                Self::log_outcome(id, &result);
            }
        }

        // Removal pass
        let present: HashSet<&str> = displays.iter().map(|d| d.connector.as_str()).collect();

        for id in self.lifecycle.active_ids() {
            let Some(current) = self.lifecycle.view(id).map(|v| v.current_display_name()) else {
                continue;
            };
            let found = current.as_deref().is_some_and(|c| present.contains(c));

            if found {
                if let Some(view) = self.lifecycle.view_mut(id) {
                    view.reconsider_display();
                }
                self.track_view_display(id);
            } else if self.lifecycle.active_count() > 1 {
                debug!(entity = %id, connector = ?current, "View must be deleted");
                self.lifecycle.detach(id);
                report.removed.push(id);
                self.emit_dock_count();
            } else {
                let protection = ShellError::LastViewProtection(id);
                info!(
                    entity = %id,
                    connector = ?current,
                    reason = %protection,
                    "Keeping last view alive"
                );
                if let Some(primary) = self.backend.displays.primary_display() {
                    self.follow_display(id, &primary);
                }
                report.redirected.push(id);
            }
        }

        info!(
            attached = report.attached.len(),
            removed = report.removed.len(),
            redirected = report.redirected.len(),
            "Topology reconciled"
        );
        self.emit(ShellEvent::TopologyReconciled {
            displays: displays.len(),
            views: self.lifecycle.active_count(),
        });

        Ok(report)
    }

    /// Records on the entity the display its view actually ended up on.
    fn track_view_display(&mut self, id: EntityId) {
        let slot = self
            .lifecycle
            .view(id)
            .and_then(|v| v.current_display_name())
            .and_then(|c| self.screens.slot_of(&c));

        if let (Some(slot), Some(entity)) = (slot, self.entities.get_mut(&id)) {
            if entity.screen != slot {
                debug!(entity = %id, from = %entity.screen, to = %slot, "View moved display");
                entity.set_screen(slot);
                self.persist(id);
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Free edges of `slot` in canonical order. The sentinel slot means
    /// the primary display.
    pub fn free_edges(&mut self, slot: DisplaySlot) -> Vec<Edge> {
        let fixed = if slot.is_assigned() {
            slot
        } else {
            self.screens.primary_slot(self.backend.store.as_mut())
        };

        let occupied = self.lifecycle.active_views().filter_map(|(id, view)| {
            self.entities
                .get(&id)
                .map(|entity| (entity.screen, view.location()))
        });

        edges::free_edges(fixed, occupied)
    }

    /// Slot bound to `connector`, binding a new one if needed.
    pub fn display_slot_id(&mut self, connector: &str) -> DisplaySlot {
        self.screens.slot_for(connector, self.backend.store.as_mut())
    }

    /// Slot of the primary display.
    pub fn primary_slot(&mut self) -> DisplaySlot {
        self.screens.primary_slot(self.backend.store.as_mut())
    }

    /// Active views on `slot` whose entity is not destroyed.
    pub fn docks_count(&self, slot: DisplaySlot) -> usize {
        if !slot.is_assigned() {
            return 0;
        }

        self.lifecycle
            .active_views()
            .filter(|(id, _)| {
                self.entities
                    .get(id)
                    .is_some_and(|e| e.screen == slot && !e.destroyed)
            })
            .count()
    }

    /// The display for `slot`, or the primary one when the slot is unknown
    /// or disconnected.
    fn display_or_primary(&self, slot: DisplaySlot) -> Option<DisplayInfo> {
        let displays = self.backend.displays.displays();
        self.present_display(slot, &displays)
            .or_else(|| self.backend.displays.primary_display())
    }

    /// Geometry of the display bound to `slot`.
    pub fn screen_geometry(&self, slot: DisplaySlot) -> Geometry {
        self.display_or_primary(slot)
            .map(|d| d.geometry)
            .unwrap_or_default()
    }

    /// Display geometry minus the space taken by top and bottom docks.
    ///
    /// Left and right docks dodge the others, so they do not shrink it.
    pub fn available_screen_rect(&self, slot: DisplaySlot) -> Geometry {
        let Some(display) = self.display_or_primary(slot) else {
            return Geometry::default();
        };

        let mut available = display.geometry;
        for (_, view) in self.lifecycle.active_views() {
            if view.current_display_name().as_deref() != Some(display.connector.as_str()) {
                continue;
            }
            let dock = view.bound_geometry();
            match view.location() {
                Edge::Top => available = available.with_top(dock.bottom()),
                Edge::Bottom => available = available.with_bottom(dock.top()),
                Edge::Left | Edge::Right => {}
            }
        }

        available
    }

    pub fn entity(&self, id: EntityId) -> Option<&PanelEntity> {
        self.entities.get(&id)
    }

    pub fn view_state(&self, id: EntityId) -> ViewState {
        self.lifecycle.state(id)
    }

    pub fn live_view_count(&self) -> usize {
        self.lifecycle.active_count()
    }

    pub fn snapshot(&self) -> ShellSnapshot {
        let displays = self
            .backend
            .displays
            .displays()
            .into_iter()
            .map(|d| DisplaySummary {
                slot: self.screens.slot_of(&d.connector),
                connector: d.connector,
                primary: d.primary,
                geometry: d.geometry,
            })
            .collect();

        let views = self
            .lifecycle
            .active_views()
            .map(|(entity, view)| ViewSummary {
                entity,
                connector: view.current_display_name(),
                edge: view.location(),
            })
            .collect();

        ShellSnapshot {
            displays,
            views,
            quarantined: self.lifecycle.quarantined_ids(),
            entities: self.entities.values().cloned().collect(),
        }
    }

    // ========================================================================
    // Configuration Maintenance
    // ========================================================================

    /// Deletes persisted groups with no live counterpart.
    ///
    /// Containment groups without a live entity go, as do applet subgroups
    /// without a live applet. The store is synced only if something was
    /// deleted. Does nothing before the layout is loaded, since every group
    /// would look obsolete. Returns the number of deleted groups.
    pub fn clean_config(&mut self) -> Result<usize, StoreError> {
        if !self.loaded {
            debug!("Layout not loaded, skipping configuration cleanup");
            return Ok(0);
        }

        let store = self.backend.store.as_mut();
        let mut deleted = 0;

        for cid in store.containment_groups() {
            match self.entities.get(&cid) {
                None => {
                    store.delete_containment_group(cid);
                    deleted += 1;
                    debug!(entity = %cid, "Obsolete containment configuration deleted");
                }
                Some(entity) => {
                    for aid in store.applet_groups(cid) {
                        if !entity.has_applet(aid) {
                            store.delete_applet_group(cid, aid);
                            deleted += 1;
                            debug!(entity = %cid, applet = %aid, "Obsolete applet configuration deleted");
                        }
                    }
                }
            }
        }

        if deleted > 0 {
            store.sync()?;
            info!(deleted, "Configuration cleaned");
        }

        Ok(deleted)
    }

    /// Cleans the configuration and releases every view.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.clean_config() {
            warn!(error = %e, "Failed to clean configuration on shutdown");
        }
        self.lifecycle.release_all();
        info!(entities = self.entities.len(), "Reconciler shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{PanelKind, DEFAULT_APPLETS};

    use crate::sim::{SimDisplays, SimPlugins, SimViews};
    use crate::store::{ConfigStore, MemoryStore};

    fn screen(connector: &str, x: i32) -> DisplayInfo {
        DisplayInfo::new(connector, Geometry::new(x, 0, 1920, 1080))
    }

    struct Harness {
        reconciler: Reconciler,
        displays: SimDisplays,
        views: SimViews,
        store: MemoryStore,
        events: broadcast::Receiver<ShellEvent>,
    }

    impl Harness {
        fn new(displays: Vec<DisplayInfo>, store: MemoryStore) -> Self {
            let sim = SimDisplays::new(displays);
            let views = SimViews::new(sim.clone());
            let backend = Backend {
                displays: Box::new(sim.clone()),
                activities: Box::new(sim.clone()),
                views: Box::new(views.clone()),
                plugins: Box::new(SimPlugins::with_defaults()),
                store: Box::new(store.clone()),
            };
            let (tx, events) = broadcast::channel(64);
            let defaults = DEFAULT_APPLETS.iter().map(|p| PluginId::from(*p)).collect();

            Self {
                reconciler: Reconciler::new(backend, tx, defaults),
                displays: sim,
                views,
                store,
                events,
            }
        }

        fn loaded(displays: Vec<DisplayInfo>, store: MemoryStore) -> Self {
            let mut harness = Self::new(displays, store);
            assert!(harness.reconciler.load());
            harness
        }

        fn drain(&mut self) -> Vec<ShellEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        fn connector_of(&self, id: u32) -> Option<String> {
            let views = self.views.views_of(EntityId::new(id));
            assert!(views.len() <= 1, "entity {id} has {} live views", views.len());
            views.into_iter().next().and_then(|v| v.display)
        }
    }

    /// Store with DP-1 on slot 0, DP-2 on slot 1 and the given entities.
    fn seeded_store(entities: &[PanelEntity]) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.write_screen_connector(DisplaySlot::new(0), "DP-1");
        store.write_screen_connector(DisplaySlot::new(1), "DP-2");
        for entity in entities {
            store.write_containment(entity);
        }
        store
    }

    fn dock_count_events(events: &[ShellEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ShellEvent::DockCountChanged { .. }))
            .count()
    }

    // ========================================================================
    // Loading
    // ========================================================================

    #[test]
    fn test_bootstrap_creates_single_bottom_panel() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());

        let snapshot = h.reconciler.snapshot();
        assert_eq!(snapshot.entities.len(), 1);

        let entity = &snapshot.entities[0];
        assert_eq!(entity.location, Edge::Bottom);
        assert!(entity.initialized);
        assert_eq!(entity.screen, DisplaySlot::new(0));
        assert_eq!(entity.applets.len(), 2);

        assert_eq!(h.views.live_views().len(), 1);
        assert_eq!(h.connector_of(entity.id.get()).as_deref(), Some("DP-1"));

        let events = h.drain();
        assert!(events.contains(&ShellEvent::EntityAdded { entity: entity.id }));
        assert!(events.contains(&ShellEvent::DockCountChanged { count: 1 }));

        // Persisted with its applets
        let persisted = h.store.read_containment(entity.id).unwrap();
        assert_eq!(persisted.applets.len(), 2);
    }

    #[test]
    fn test_load_waits_for_activities() {
        let mut h = Harness::new(vec![screen("DP-1", 0)], MemoryStore::new());
        h.displays.set_activities_running(false);

        assert!(!h.reconciler.load());
        assert!(!h.reconciler.is_loaded());
        assert!(h.views.live_views().is_empty());

        h.displays.set_activities_running(true);
        assert!(h.reconciler.load());
        assert!(h.reconciler.is_loaded());
        assert_eq!(h.views.live_views().len(), 1);

        // Only once
        assert!(!h.reconciler.load());
        assert_eq!(h.views.created_count(), 1);
    }

    #[test]
    fn test_load_restores_entity_on_last_known_display() {
        let entity = PanelEntity::panel(EntityId::new(1)).with_last_screen(DisplaySlot::new(1));
        let h = Harness::loaded(
            vec![screen("DP-1", 0).as_primary(), screen("DP-2", 1920)],
            seeded_store(&[entity]),
        );

        assert_eq!(h.connector_of(1).as_deref(), Some("DP-2"));
        assert_eq!(
            h.reconciler.entity(EntityId::new(1)).map(|e| e.screen),
            Some(DisplaySlot::new(1))
        );
    }

    // ========================================================================
    // Topology Pass
    // ========================================================================

    #[test]
    fn test_returning_display_gets_its_entity_back() {
        let entity = PanelEntity::panel(EntityId::new(1)).with_last_screen(DisplaySlot::new(1));
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], seeded_store(&[entity]));

        // DP-2 is absent, so the entity waits
        assert_eq!(h.reconciler.view_state(EntityId::new(1)), ViewState::Unattached);

        let dp2 = screen("DP-2", 1920);
        h.displays.add(dp2.clone());
        h.reconciler.display_added(&dp2);
        let report = h.reconciler.reconcile_displays().unwrap();

        assert_eq!(report.attached, vec![EntityId::new(1)]);
        assert_eq!(h.connector_of(1).as_deref(), Some("DP-2"));
    }

    #[test]
    fn test_removed_display_loses_its_view() {
        let a = PanelEntity::panel(EntityId::new(1)).on_screen(DisplaySlot::new(0));
        let b = PanelEntity::panel(EntityId::new(2)).on_screen(DisplaySlot::new(1));
        let mut h = Harness::loaded(
            vec![screen("DP-1", 0), screen("DP-2", 1920)],
            seeded_store(&[a, b]),
        );
        assert_eq!(h.reconciler.live_view_count(), 2);
        h.drain();

        h.displays.remove("DP-2");
        h.reconciler.display_removed("DP-2");
        let report = h.reconciler.reconcile_displays().unwrap();

        assert_eq!(report.removed, vec![EntityId::new(2)]);
        assert!(report.redirected.is_empty());
        assert!(h.views.views_of(EntityId::new(2)).is_empty());
        assert_eq!(h.connector_of(1).as_deref(), Some("DP-1"));

        let events = h.drain();
        assert_eq!(dock_count_events(&events), 1);
        assert!(events.contains(&ShellEvent::DockCountChanged { count: 1 }));

        // The entity remembers where it belongs
        assert_eq!(
            h.reconciler.entity(EntityId::new(2)).map(|e| e.screen),
            Some(DisplaySlot::new(1))
        );

        // And goes back once the display returns
        h.displays.add(screen("DP-2", 1920));
        let report = h.reconciler.reconcile_displays().unwrap();
        assert_eq!(report.attached, vec![EntityId::new(2)]);
        assert_eq!(h.connector_of(2).as_deref(), Some("DP-2"));
    }

    #[test]
    fn test_last_view_follows_primary() {
        let entity = PanelEntity::panel(EntityId::new(1)).on_screen(DisplaySlot::new(1));
        let mut h = Harness::loaded(
            vec![screen("DP-1", 0).as_primary(), screen("DP-2", 1920)],
            seeded_store(&[entity]),
        );
        assert_eq!(h.connector_of(1).as_deref(), Some("DP-2"));

        h.displays.remove("DP-2");
        let report = h.reconciler.reconcile_displays().unwrap();

        assert!(report.removed.is_empty());
        assert_eq!(report.redirected, vec![EntityId::new(1)]);
        assert_eq!(h.reconciler.live_view_count(), 1);

        let view = &h.views.views_of(EntityId::new(1))[0];
        assert_eq!(view.display.as_deref(), Some("DP-1"));
        assert_eq!(view.follows, 1);
        assert_eq!(
            h.reconciler.entity(EntityId::new(1)).map(|e| e.screen),
            Some(DisplaySlot::new(0))
        );
    }

    #[test]
    fn test_no_displays_defers_everything() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        h.displays.remove("DP-1");

        let result = h.reconciler.reconcile_displays();
        assert!(matches!(result, Err(ShellError::NoDisplaysAvailable)));
        assert_eq!(h.views.live_views().len(), 1);

        let result = h.reconciler.add_entity(PanelEntity::panel(EntityId::new(9)));
        assert!(matches!(result, Err(ShellError::NoDisplaysAvailable)));
    }

    #[test]
    fn test_bootstrap_panel_waits_for_first_display() {
        let mut h = Harness::loaded(Vec::new(), MemoryStore::new());
        assert_eq!(h.reconciler.snapshot().entities.len(), 1);
        assert!(h.views.live_views().is_empty());

        let output = screen("DP-1", 0).as_primary();
        h.displays.add(output.clone());
        h.reconciler.display_added(&output);
        let report = h.reconciler.reconcile_displays().unwrap();

        assert_eq!(report.attached, vec![EntityId::new(1)]);
        assert_eq!(h.views.live_views().len(), 1);
        assert_eq!(h.connector_of(1).as_deref(), Some("DP-1"));
        assert_eq!(
            h.reconciler.entity(EntityId::new(1)).map(|e| e.screen),
            Some(DisplaySlot::new(0))
        );
    }

    #[test]
    fn test_surviving_views_reconsider_and_stick() {
        let a = PanelEntity::panel(EntityId::new(1)).on_screen(DisplaySlot::new(0));
        let b = PanelEntity::panel(EntityId::new(2)).on_screen(DisplaySlot::new(1));
        let mut h = Harness::loaded(
            vec![screen("DP-1", 0), screen("DP-2", 1920)],
            seeded_store(&[a, b]),
        );

        // The compositor moved entity 2 on its own
        h.views.migrate(EntityId::new(2), "DP-1");
        let report = h.reconciler.reconcile_displays().unwrap();

        assert!(report.is_empty());
        assert_eq!(h.views.views_of(EntityId::new(1))[0].reconsiders, 1);
        assert_eq!(
            h.reconciler.entity(EntityId::new(2)).map(|e| e.screen),
            Some(DisplaySlot::new(0))
        );
        assert_eq!(h.reconciler.screen_for_entity(EntityId::new(2)), DisplaySlot::new(0));
    }

    #[test]
    fn test_primary_change_rebinds_single_view() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());

        h.displays.remove("DP-1");
        h.displays.add(screen("HDMI-1", 0).as_primary());
        assert!(h.reconciler.primary_output_changed());

        let view = &h.views.views_of(EntityId::new(1))[0];
        assert_eq!(view.display.as_deref(), Some("HDMI-1"));
        assert_eq!(view.follows, 1);
        assert_eq!(
            h.reconciler.entity(EntityId::new(1)).map(|e| e.screen),
            Some(DisplaySlot::new(1))
        );
        assert_eq!(h.reconciler.primary_slot(), DisplaySlot::new(1));
    }

    #[test]
    fn test_primary_change_leaves_multi_display_alone() {
        let a = PanelEntity::panel(EntityId::new(1)).on_screen(DisplaySlot::new(0));
        let mut h = Harness::loaded(
            vec![screen("DP-1", 0).as_primary(), screen("DP-2", 1920)],
            seeded_store(&[a]),
        );

        h.displays.set_primary("DP-2");
        assert!(h.reconciler.primary_output_changed());
        assert_eq!(h.connector_of(1).as_deref(), Some("DP-1"));
        assert_eq!(h.views.views_of(EntityId::new(1))[0].follows, 0);

        // Nothing changed the second time
        assert!(!h.reconciler.primary_output_changed());
    }

    #[test]
    fn test_primary_change_before_load_keeps_persisted_slots() {
        let mut store = MemoryStore::new();
        store.write_screen_connector(DisplaySlot::new(0), "DP-1");
        let mut h = Harness::new(
            vec![screen("DP-1", 0), screen("DP-2", 1920).as_primary()],
            store,
        );
        h.displays.set_activities_running(false);

        h.reconciler.primary_output_changed();
        assert_eq!(h.reconciler.primary_slot(), DisplaySlot::new(1));
        assert_eq!(h.reconciler.display_slot_id("DP-1"), DisplaySlot::new(0));

        h.displays.set_activities_running(true);
        assert!(h.reconciler.load());

        let bindings = h.store.screen_connectors();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings.get(&DisplaySlot::new(0)).map(String::as_str), Some("DP-1"));
        assert_eq!(bindings.get(&DisplaySlot::new(1)).map(String::as_str), Some("DP-2"));
    }

    // ========================================================================
    // Entity Lifecycle
    // ========================================================================

    #[test]
    fn test_attach_is_idempotent() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        let id = EntityId::new(5);

        let first = h
            .reconciler
            .add_entity(PanelEntity::panel(id).with_location(Edge::Top))
            .unwrap();
        let second = h.reconciler.add_dock(id).unwrap();

        assert_eq!(first, AttachOutcome::Attached);
        assert_eq!(second, AttachOutcome::AlreadyAttached);
        assert_eq!(h.views.views_of(id).len(), 1);
        assert_eq!(h.views.created_count(), 2);
    }

    #[test]
    fn test_attach_rejects_bad_plugins() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());

        let missing = PanelEntity::new(EntityId::new(7), PluginId::from("missing"), PanelKind::Panel);
        let result = h.reconciler.add_entity(missing);
        assert!(matches!(result, Err(ShellError::InvalidPlugin { .. })));

        let tray = PanelEntity::new(
            EntityId::new(8),
            PluginId::from("berth.private.systemtray"),
            PanelKind::Panel,
        );
        let result = h.reconciler.add_entity(tray);
        assert!(matches!(result, Err(ShellError::ReservedPlugin { .. })));

        assert_eq!(h.views.created_count(), 1);
        assert_eq!(h.reconciler.view_state(EntityId::new(7)), ViewState::Unattached);
    }

    #[test]
    fn test_destroy_abort_keeps_same_view() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        let id = EntityId::new(1);
        h.drain();

        h.reconciler.destroyed_changed(id, true);
        assert_eq!(h.reconciler.view_state(id), ViewState::Quarantined);
        assert_eq!(h.reconciler.live_view_count(), 0);
        assert_eq!(h.views.views_of(id).len(), 1);
        assert_eq!(h.reconciler.docks_count(DisplaySlot::new(0)), 0);

        // Quarantined entities are not reconciled
        let report = h.reconciler.reconcile_displays().unwrap();
        assert!(report.attached.is_empty());

        h.reconciler.destroyed_changed(id, false);
        assert_eq!(h.reconciler.view_state(id), ViewState::Attached);
        assert_eq!(h.views.views_of(id).len(), 1);
        assert_eq!(h.views.created_count(), 1);

        let events = h.drain();
        assert!(events.contains(&ShellEvent::DockCountChanged { count: 0 }));
        assert!(events.contains(&ShellEvent::DockCountChanged { count: 1 }));
    }

    #[test]
    fn test_destroy_completes() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        let id = EntityId::new(1);

        h.reconciler.destroyed_changed(id, true);
        h.reconciler.entity_destroyed(id);

        assert_eq!(h.reconciler.view_state(id), ViewState::Unattached);
        assert!(h.reconciler.entity(id).is_none());
        assert!(h.views.live_views().is_empty());
        assert!(h.reconciler.snapshot().quarantined.is_empty());
    }

    #[test]
    fn test_location_change_moves_view() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        let id = EntityId::new(1);
        h.drain();

        h.reconciler.location_changed(id, Edge::Left);
        assert_eq!(h.views.views_of(id)[0].location, Edge::Left);
        assert_eq!(h.store.read_containment(id).map(|e| e.location), Some(Edge::Left));
        assert_eq!(
            h.drain(),
            vec![ShellEvent::LocationChanged {
                entity: id,
                edge: Edge::Left
            }]
        );

        // Same edge again is a no-op
        h.reconciler.location_changed(id, Edge::Left);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_alternatives_request_needs_known_applet() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        let id = EntityId::new(1);
        h.drain();

        assert!(h.reconciler.alternatives_requested(id, AppletId::new(1)));
        assert!(!h.reconciler.alternatives_requested(id, AppletId::new(42)));
        assert_eq!(
            h.drain(),
            vec![ShellEvent::AlternativesRequested {
                entity: id,
                applet: AppletId::new(1)
            }]
        );
    }

    #[test]
    fn test_set_entity_screen_recreates_view() {
        let mut h = Harness::loaded(
            vec![screen("DP-1", 0).as_primary(), screen("DP-2", 1920)],
            seeded_store(&[]),
        );
        let id = EntityId::new(1);
        assert_eq!(h.connector_of(1).as_deref(), Some("DP-1"));

        h.reconciler.set_entity_screen(id, DisplaySlot::new(1)).unwrap();
        assert_eq!(h.connector_of(1).as_deref(), Some("DP-2"));
        assert_eq!(h.views.created_count(), 2);

        // A slot without a connected display parks the entity
        h.reconciler.set_entity_screen(id, DisplaySlot::new(5)).unwrap();
        assert_eq!(h.reconciler.view_state(id), ViewState::Unattached);
        assert!(h.views.live_views().is_empty());

        let result = h.reconciler.set_entity_screen(EntityId::new(99), DisplaySlot::new(0));
        assert!(matches!(result, Err(ShellError::EntityNotFound(_))));
    }

    // ========================================================================
    // Display Resolution
    // ========================================================================

    #[test]
    fn test_nested_entity_follows_parent() {
        let parent = PanelEntity::panel(EntityId::new(1)).on_screen(DisplaySlot::new(1));
        let child = PanelEntity::new(EntityId::new(2), PluginId::shell_panel(), PanelKind::Embedded)
            .on_screen(DisplaySlot::new(0))
            .with_parent(EntityId::new(1));
        let h = Harness::loaded(
            vec![screen("DP-1", 0), screen("DP-2", 1920)],
            seeded_store(&[parent, child]),
        );

        assert_eq!(h.reconciler.screen_for_entity(EntityId::new(2)), DisplaySlot::new(1));
        assert_eq!(h.connector_of(2).as_deref(), Some("DP-2"));
    }

    #[test]
    fn test_nesting_cycle_is_unresolved() {
        let a = PanelEntity::panel(EntityId::new(1)).with_parent(EntityId::new(2));
        let b = PanelEntity::panel(EntityId::new(2)).with_parent(EntityId::new(1));
        let h = Harness::loaded(vec![screen("DP-1", 0)], seeded_store(&[a, b]));

        assert_eq!(h.reconciler.screen_for_entity(EntityId::new(1)), DisplaySlot::UNASSIGNED);
        assert!(h.views.live_views().is_empty());
    }

    #[test]
    fn test_activity_scoped_entity() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], seeded_store(&[]));
        let id = EntityId::new(3);
        let scoped = PanelEntity::new(id, PluginId::shell_panel(), PanelKind::Embedded)
            .on_screen(DisplaySlot::new(0))
            .with_activity("work");

        let result = h.reconciler.add_entity(scoped);
        assert!(matches!(result, Err(ShellError::UnresolvedTarget(_))));
        assert_eq!(h.reconciler.screen_for_entity(id), DisplaySlot::UNASSIGNED);

        h.displays.set_current_activity(Some("work"));
        assert_eq!(h.reconciler.screen_for_entity(id), DisplaySlot::new(0));

        let report = h.reconciler.reconcile_displays().unwrap();
        assert_eq!(report.attached, vec![id]);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[test]
    fn test_free_edges_and_docks_count() {
        let mut h = Harness::loaded(
            vec![screen("DP-1", 0).as_primary(), screen("DP-2", 1920)],
            seeded_store(&[]),
        );

        let expected = vec![Edge::Left, Edge::Top, Edge::Right];
        assert_eq!(h.reconciler.free_edges(DisplaySlot::new(0)), expected);
        assert_eq!(h.reconciler.free_edges(DisplaySlot::UNASSIGNED), expected);
        assert_eq!(h.reconciler.free_edges(DisplaySlot::new(1)), Edge::CANONICAL.to_vec());

        assert_eq!(h.reconciler.docks_count(DisplaySlot::new(0)), 1);
        assert_eq!(h.reconciler.docks_count(DisplaySlot::new(1)), 0);
        assert_eq!(h.reconciler.docks_count(DisplaySlot::UNASSIGNED), 0);

        assert_eq!(h.reconciler.display_slot_id("DP-2"), DisplaySlot::new(1));
        assert_eq!(h.reconciler.display_slot_id("HDMI-1"), DisplaySlot::new(2));
        assert_eq!(h.reconciler.primary_slot(), DisplaySlot::new(0));
    }

    #[test]
    fn test_available_screen_rect() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        let slot = DisplaySlot::new(0);

        assert_eq!(h.reconciler.screen_geometry(slot), Geometry::new(0, 0, 1920, 1080));
        assert_eq!(
            h.reconciler.available_screen_rect(slot),
            Geometry::new(0, 0, 1920, 1032)
        );

        h.reconciler
            .add_entity(PanelEntity::panel(EntityId::new(2)).with_location(Edge::Top).on_screen(slot))
            .unwrap();
        h.reconciler
            .add_entity(PanelEntity::panel(EntityId::new(3)).with_location(Edge::Left).on_screen(slot))
            .unwrap();

        assert_eq!(
            h.reconciler.available_screen_rect(slot),
            Geometry::new(0, 48, 1920, 984)
        );
        // Unknown slots fall back to the primary display
        assert_eq!(
            h.reconciler.screen_geometry(DisplaySlot::new(7)),
            Geometry::new(0, 0, 1920, 1080)
        );
    }

    // ========================================================================
    // Configuration Maintenance
    // ========================================================================

    #[test]
    fn test_clean_config_deletes_obsolete_groups() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        let id = EntityId::new(1);

        let mut writer = h.store.clone();
        writer.write_containment(&PanelEntity::panel(EntityId::new(9)));
        assert!(h.reconciler.remove_applet(id, AppletId::new(1)).unwrap());
        assert_eq!(h.store.applet_groups(id).len(), 2);

        let syncs = h.store.sync_count();
        assert_eq!(h.reconciler.clean_config().unwrap(), 2);
        assert_eq!(h.store.sync_count(), syncs + 1);
        assert_eq!(h.store.containment_groups(), vec![id]);
        assert_eq!(h.store.applet_groups(id), vec![AppletId::new(2)]);

        // Nothing left to do, no sync
        assert_eq!(h.reconciler.clean_config().unwrap(), 0);
        assert_eq!(h.store.sync_count(), syncs + 1);
    }

    #[test]
    fn test_clean_config_before_load_is_noop() {
        let store = seeded_store(&[PanelEntity::panel(EntityId::new(4))]);
        let mut h = Harness::new(vec![screen("DP-1", 0)], store);

        assert_eq!(h.reconciler.clean_config().unwrap(), 0);
        assert_eq!(h.store.containment_groups(), vec![EntityId::new(4)]);
    }

    #[test]
    fn test_shutdown_releases_views() {
        let mut h = Harness::loaded(vec![screen("DP-1", 0)], MemoryStore::new());
        h.reconciler.shutdown();

        assert!(h.views.live_views().is_empty());
        assert_eq!(h.views.all_views().len(), 1);
    }
}
