//! Headless collaborators.
//!
//! In-process stand-ins for the windowing layer, dock views and plugin
//! loader. They drive the engine from the `berthd replay` command and from
//! tests, and record what the engine asked of them.
//!
//! Handles are cheap clones over shared state, so a test can keep one to
//! mutate the topology after the engine took ownership of another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use berth_core::{
    DisplayInfo, Edge, EntityId, Geometry, PanelEntity, PluginId, DEFAULT_APPLETS,
    RESERVED_PLUGINS, SHELL_PANEL_PLUGIN,
};

use crate::backend::{ActivityTracker, DisplayServer, LiveView, PluginLoader, PluginMetadata, ViewFactory};

/// Thickness of a simulated dock, in pixels.
pub const SIM_DOCK_THICKNESS: i32 = 48;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Displays and Activities
// ============================================================================

#[derive(Debug)]
struct DisplayState {
    displays: Vec<DisplayInfo>,
    activities_running: bool,
    current_activity: Option<String>,
}

/// Simulated windowing layer and activity service.
#[derive(Debug, Clone)]
pub struct SimDisplays {
    state: Arc<Mutex<DisplayState>>,
}

impl SimDisplays {
    /// Creates a topology with the activity service already running.
    pub fn new(displays: Vec<DisplayInfo>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DisplayState {
                displays,
                activities_running: true,
                current_activity: Some("default".to_string()),
            })),
        }
    }

    /// Plugs in a display. Replaces any display on the same connector.
    pub fn add(&self, display: DisplayInfo) {
        let mut state = lock(&self.state);
        state.displays.retain(|d| d.connector != display.connector);
        if display.primary {
            for d in &mut state.displays {
                d.primary = false;
            }
        }
        state.displays.push(display);
    }

    /// Unplugs a display. Returns whether it was present.
    pub fn remove(&self, connector: &str) -> bool {
        let mut state = lock(&self.state);
        let before = state.displays.len();
        state.displays.retain(|d| d.connector != connector);
        state.displays.len() != before
    }

    /// Makes `connector` the primary display. Returns whether it is present.
    pub fn set_primary(&self, connector: &str) -> bool {
        let mut state = lock(&self.state);
        if !state.displays.iter().any(|d| d.connector == connector) {
            return false;
        }
        for d in &mut state.displays {
            d.primary = d.connector == connector;
        }
        true
    }

    pub fn set_activities_running(&self, running: bool) {
        lock(&self.state).activities_running = running;
    }

    pub fn set_current_activity(&self, activity: Option<&str>) {
        lock(&self.state).current_activity = activity.map(str::to_string);
    }

    fn find(&self, connector: &str) -> Option<DisplayInfo> {
        lock(&self.state)
            .displays
            .iter()
            .find(|d| d.connector == connector)
            .cloned()
    }
}

impl DisplayServer for SimDisplays {
    fn displays(&self) -> Vec<DisplayInfo> {
        lock(&self.state).displays.clone()
    }
}

impl ActivityTracker for SimDisplays {
    fn is_running(&self) -> bool {
        lock(&self.state).activities_running
    }

    fn current_activity(&self) -> Option<String> {
        lock(&self.state).current_activity.clone()
    }
}

// ============================================================================
// Views
// ============================================================================

/// What a simulated view has been told so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimViewRecord {
    pub entity: EntityId,
    /// Connector the view is on.
    pub display: Option<String>,
    pub location: Edge,
    pub visible: bool,
    pub destroyed: bool,
    /// Number of `reconsider_display` calls.
    pub reconsiders: usize,
    /// Number of `set_display_to_follow` calls.
    pub follows: usize,
}

/// Factory for simulated views. Keeps a record of every view it created.
#[derive(Debug, Clone)]
pub struct SimViews {
    displays: SimDisplays,
    records: Arc<Mutex<Vec<Arc<Mutex<SimViewRecord>>>>>,
}

impl SimViews {
    pub fn new(displays: SimDisplays) -> Self {
        Self {
            displays,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every view ever created, destroyed ones included.
    pub fn all_views(&self) -> Vec<SimViewRecord> {
        lock(&self.records)
            .iter()
            .map(|r| lock(r).clone())
            .collect()
    }

    /// Views not yet destroyed.
    pub fn live_views(&self) -> Vec<SimViewRecord> {
        self.all_views()
            .into_iter()
            .filter(|r| !r.destroyed)
            .collect()
    }

    /// Live views of one entity.
    pub fn views_of(&self, entity: EntityId) -> Vec<SimViewRecord> {
        self.live_views()
            .into_iter()
            .filter(|r| r.entity == entity)
            .collect()
    }

    pub fn created_count(&self) -> usize {
        lock(&self.records).len()
    }

    /// Moves a live view to another display behind the engine's back, the
    /// way a compositor migrates windows on its own.
    pub fn migrate(&self, entity: EntityId, connector: &str) {
        for record in lock(&self.records).iter() {
            let mut record = lock(record);
            if record.entity == entity && !record.destroyed {
                record.display = Some(connector.to_string());
            }
        }
    }
}

impl ViewFactory for SimViews {
    fn create(&mut self, entity: &PanelEntity, target: &DisplayInfo) -> Box<dyn LiveView> {
        let record = Arc::new(Mutex::new(SimViewRecord {
            entity: entity.id,
            display: Some(target.connector.clone()),
            location: entity.location,
            visible: false,
            destroyed: false,
            reconsiders: 0,
            follows: 0,
        }));
        lock(&self.records).push(Arc::clone(&record));

        Box::new(SimView {
            record,
            displays: self.displays.clone(),
        })
    }
}

/// A simulated dock view.
pub struct SimView {
    record: Arc<Mutex<SimViewRecord>>,
    displays: SimDisplays,
}

impl LiveView for SimView {
    fn show(&mut self) {
        lock(&self.record).visible = true;
    }

    fn destroy_later(&mut self) {
        let mut record = lock(&self.record);
        record.visible = false;
        record.destroyed = true;
    }

    fn current_display_name(&self) -> Option<String> {
        lock(&self.record).display.clone()
    }

    fn bound_geometry(&self) -> Geometry {
        let record = lock(&self.record);
        let Some(screen) = record
            .display
            .as_deref()
            .and_then(|c| self.displays.find(c))
        else {
            return Geometry::default();
        };

        let g = screen.geometry;
        let t = SIM_DOCK_THICKNESS;
        match record.location {
            Edge::Top => Geometry::new(g.x, g.y, g.width, t),
            Edge::Bottom => Geometry::new(g.x, g.bottom() - t, g.width, t),
            Edge::Left => Geometry::new(g.x, g.y, t, g.height),
            Edge::Right => Geometry::new(g.right() - t, g.y, t, g.height),
        }
    }

    fn location(&self) -> Edge {
        lock(&self.record).location
    }

    fn set_location(&mut self, edge: Edge) {
        lock(&self.record).location = edge;
    }

    fn reconsider_display(&mut self) {
        let mut record = lock(&self.record);
        record.reconsiders += 1;

        let present = record
            .display
            .as_deref()
            .is_some_and(|c| self.displays.find(c).is_some());
        if !present {
            record.display = self.displays.primary_display().map(|d| d.connector);
        }
    }

    fn set_display_to_follow(&mut self, display: &DisplayInfo) {
        let mut record = lock(&self.record);
        record.follows += 1;
        record.display = Some(display.connector.clone());
    }
}

// ============================================================================
// Plugins
// ============================================================================

/// Plugin loader over a fixed set of installed package ids.
#[derive(Debug, Clone, Default)]
pub struct SimPlugins {
    installed: HashSet<PluginId>,
}

impl SimPlugins {
    pub fn new<I, S>(installed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            installed: installed.into_iter().map(PluginId::new).collect(),
        }
    }

    /// The shell panel, the reserved internal types and the default applets.
    pub fn with_defaults() -> Self {
        Self::new(
            std::iter::once(SHELL_PANEL_PLUGIN)
                .chain(RESERVED_PLUGINS.iter().copied())
                .chain(DEFAULT_APPLETS.iter().copied()),
        )
    }
}

impl PluginLoader for SimPlugins {
    fn resolve(&self, plugin: &PluginId) -> Option<PluginMetadata> {
        self.installed.get(plugin).map(|id| PluginMetadata {
            id: id.clone(),
            name: id.as_str().rsplit('.').next().unwrap_or(id.as_str()).to_string(),
        })
    }
}
