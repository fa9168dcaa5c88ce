//! Persisted shell configuration.
//!
//! The store is a small group hierarchy:
//!
//! ```text
//! ScreenConnectors            slot -> connector name
//! Containments/<id>           panel entity fields
//! Containments/<id>/Applets/<id>
//! ```
//!
//! The engine only reads and writes through [`ConfigStore`]; how the
//! hierarchy is laid out on disk is up to the implementation. Two are
//! provided: [`TomlStore`] (a single TOML file) and [`MemoryStore`].
//!
//! Writes are buffered until [`ConfigStore::sync`] is called.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use berth_core::{
    Applet, AppletId, DisplaySlot, Edge, EntityId, PanelEntity, PanelKind, PluginId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading or syncing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The backing file is not valid.
    #[error("failed to parse {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The in-memory document could not be encoded.
    #[error("failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),
}

// ============================================================================
// Store Trait
// ============================================================================

/// Grouped key/value storage for screen bindings and panel entities.
pub trait ConfigStore: Send {
    /// All persisted slot -> connector bindings.
    fn screen_connectors(&self) -> BTreeMap<DisplaySlot, String>;

    /// Records a slot -> connector binding.
    fn write_screen_connector(&mut self, slot: DisplaySlot, connector: &str);

    /// Ids of every persisted containment group.
    fn containment_groups(&self) -> Vec<EntityId>;

    /// Ids of every applet subgroup of a containment group.
    fn applet_groups(&self, containment: EntityId) -> Vec<AppletId>;

    /// Reads a containment group back into an entity.
    fn read_containment(&self, id: EntityId) -> Option<PanelEntity>;

    /// Writes an entity's fields and adds groups for its applets.
    ///
    /// Applet groups that no longer belong to the entity are left in place;
    /// they are removed by configuration garbage collection.
    fn write_containment(&mut self, entity: &PanelEntity);

    fn delete_containment_group(&mut self, id: EntityId);

    fn delete_applet_group(&mut self, containment: EntityId, applet: AppletId);

    /// Flushes buffered writes to durable storage.
    fn sync(&mut self) -> Result<(), StoreError>;
}

// ============================================================================
// Document Model
// ============================================================================

/// On-disk shape of the store. Group keys are strings so the document
/// maps one-to-one onto TOML tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShellDocument {
    #[serde(default)]
    screen_connectors: BTreeMap<String, String>,
    #[serde(default)]
    containments: BTreeMap<String, ContainmentGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ContainmentGroup {
    plugin: PluginId,
    #[serde(default)]
    kind: PanelKind,
    #[serde(default)]
    location: Edge,
    #[serde(default)]
    screen: DisplaySlot,
    #[serde(default)]
    last_screen: DisplaySlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<EntityId>,
    #[serde(default)]
    initialized: bool,
    #[serde(default, rename = "Applets")]
    applets: BTreeMap<String, AppletGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AppletGroup {
    plugin: PluginId,
}

/// Parses group keys, skipping (and logging) anything that is not a number.
fn parse_keys<'a, T, I>(group: &str, keys: I, make: fn(u32) -> T) -> Vec<T>
where
    I: Iterator<Item = &'a String>,
{
    keys.filter_map(|key| match key.parse::<u32>() {
        Ok(id) => Some(make(id)),
        Err(_) => {
            warn!(group, key = %key, "Ignoring non-numeric configuration group");
            None
        }
    })
    .collect()
}

impl ShellDocument {
    fn screen_connectors(&self) -> BTreeMap<DisplaySlot, String> {
        self.screen_connectors
            .iter()
            .filter_map(|(slot, connector)| match slot.parse::<DisplaySlot>() {
                Ok(slot) if slot.is_assigned() => Some((slot, connector.clone())),
                _ => {
                    warn!(key = %slot, "Ignoring invalid screen connector binding");
                    None
                }
            })
            .collect()
    }

    fn write_screen_connector(&mut self, slot: DisplaySlot, connector: &str) {
        self.screen_connectors
            .insert(slot.to_string(), connector.to_string());
    }

    fn containment_groups(&self) -> Vec<EntityId> {
        parse_keys("Containments", self.containments.keys(), EntityId::new)
    }

    fn applet_groups(&self, containment: EntityId) -> Vec<AppletId> {
        self.containments
            .get(&containment.to_string())
            .map(|group| parse_keys("Applets", group.applets.keys(), AppletId::new))
            .unwrap_or_default()
    }

    fn read_containment(&self, id: EntityId) -> Option<PanelEntity> {
        let group = self.containments.get(&id.to_string())?;
        let mut entity = PanelEntity::new(id, group.plugin.clone(), group.kind);
        entity.location = group.location;
        entity.screen = group.screen;
        entity.last_screen = group.last_screen;
        entity.activity = group.activity.clone();
        entity.parent = group.parent;
        entity.initialized = group.initialized;
        entity.applets = group
            .applets
            .iter()
            .filter_map(|(key, applet)| {
                key.parse::<u32>().ok().map(|id| Applet {
                    id: AppletId::new(id),
                    plugin: applet.plugin.clone(),
                })
            })
            .collect();
        entity.applets.sort_by_key(|a| a.id);
        Some(entity)
    }

    fn write_containment(&mut self, entity: &PanelEntity) {
        let mut applets = self
            .containments
            .remove(&entity.id.to_string())
            .map(|group| group.applets)
            .unwrap_or_default();

        for applet in &entity.applets {
            applets.insert(
                applet.id.to_string(),
                AppletGroup {
                    plugin: applet.plugin.clone(),
                },
            );
        }

        self.containments.insert(
            entity.id.to_string(),
            ContainmentGroup {
                plugin: entity.plugin.clone(),
                kind: entity.kind,
                location: entity.location,
                screen: entity.screen,
                last_screen: entity.last_screen,
                activity: entity.activity.clone(),
                parent: entity.parent,
                initialized: entity.initialized,
                applets,
            },
        );
    }

    fn delete_containment_group(&mut self, id: EntityId) {
        self.containments.remove(&id.to_string());
    }

    fn delete_applet_group(&mut self, containment: EntityId, applet: AppletId) {
        if let Some(group) = self.containments.get_mut(&containment.to_string()) {
            group.applets.remove(&applet.to_string());
        }
    }
}

// ============================================================================
// TOML File Store
// ============================================================================

/// Store backed by a single TOML file.
///
/// Sync writes a temporary sibling file and renames it over the original,
/// so a crash never leaves a half-written configuration behind.
#[derive(Debug)]
pub struct TomlStore {
    path: PathBuf,
    document: ShellDocument,
    dirty: bool,
}

impl TomlStore {
    /// Opens the store at `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let document = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|source| StoreError::Decode {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file yet, starting empty");
                ShellDocument::default()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            document,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn touch(&mut self) -> &mut ShellDocument {
        self.dirty = true;
        &mut self.document
    }
}

impl ConfigStore for TomlStore {
    fn screen_connectors(&self) -> BTreeMap<DisplaySlot, String> {
        self.document.screen_connectors()
    }

    fn write_screen_connector(&mut self, slot: DisplaySlot, connector: &str) {
        self.touch().write_screen_connector(slot, connector);
    }

    fn containment_groups(&self) -> Vec<EntityId> {
        self.document.containment_groups()
    }

    fn applet_groups(&self, containment: EntityId) -> Vec<AppletId> {
        self.document.applet_groups(containment)
    }

    fn read_containment(&self, id: EntityId) -> Option<PanelEntity> {
        self.document.read_containment(id)
    }

    fn write_containment(&mut self, entity: &PanelEntity) {
        self.touch().write_containment(entity);
    }

    fn delete_containment_group(&mut self, id: EntityId) {
        self.touch().delete_containment_group(id);
    }

    fn delete_applet_group(&mut self, containment: EntityId, applet: AppletId) {
        self.touch().delete_applet_group(containment, applet);
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }

        let content = toml::to_string_pretty(&self.document)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        self.dirty = false;
        debug!(path = %self.path.display(), "Configuration synced");
        Ok(())
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    document: ShellDocument,
    syncs: usize,
}

/// Volatile store. Clones share the same document, so a caller can keep a
/// clone to inspect what the engine wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `sync` has been called.
    pub fn sync_count(&self) -> usize {
        self.lock().syncs
    }

    /// Copy of the current document.
    pub fn document(&self) -> ShellDocument {
        self.lock().document.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for MemoryStore {
    fn screen_connectors(&self) -> BTreeMap<DisplaySlot, String> {
        self.lock().document.screen_connectors()
    }

    fn write_screen_connector(&mut self, slot: DisplaySlot, connector: &str) {
        self.lock().document.write_screen_connector(slot, connector);
    }

    fn containment_groups(&self) -> Vec<EntityId> {
        self.lock().document.containment_groups()
    }

    fn applet_groups(&self, containment: EntityId) -> Vec<AppletId> {
        self.lock().document.applet_groups(containment)
    }

    fn read_containment(&self, id: EntityId) -> Option<PanelEntity> {
        self.lock().document.read_containment(id)
    }

    fn write_containment(&mut self, entity: &PanelEntity) {
        self.lock().document.write_containment(entity);
    }

    fn delete_containment_group(&mut self, id: EntityId) {
        self.lock().document.delete_containment_group(id);
    }

    fn delete_applet_group(&mut self, containment: EntityId, applet: AppletId) {
        self.lock().document.delete_applet_group(containment, applet);
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.lock().syncs += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entity() -> PanelEntity {
        let mut entity = PanelEntity::panel(EntityId::new(7))
            .with_location(Edge::Top)
            .on_screen(DisplaySlot::new(1));
        entity.add_applet(PluginId::from("berth.tasks"));
        entity.add_applet(PluginId::from("berth.clock"));
        entity
    }

    #[test]
    fn test_containment_round_trip() {
        let mut store = MemoryStore::new();
        let entity = sample_entity();
        store.write_containment(&entity);

        assert_eq!(store.containment_groups(), vec![EntityId::new(7)]);
        assert_eq!(
            store.applet_groups(EntityId::new(7)),
            vec![AppletId::new(1), AppletId::new(2)]
        );
        assert_eq!(store.read_containment(EntityId::new(7)), Some(entity));
    }

    #[test]
    fn test_write_keeps_stale_applet_groups() {
        let mut store = MemoryStore::new();
        let mut entity = sample_entity();
        store.write_containment(&entity);

        entity.remove_applet(AppletId::new(1));
        store.write_containment(&entity);

        assert_eq!(store.applet_groups(EntityId::new(7)).len(), 2);
        store.delete_applet_group(EntityId::new(7), AppletId::new(1));
        assert_eq!(store.applet_groups(EntityId::new(7)), vec![AppletId::new(2)]);
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        writer.write_screen_connector(DisplaySlot::new(0), "DP-1");
        writer.sync().unwrap();

        assert_eq!(store.sync_count(), 1);
        assert_eq!(
            store.screen_connectors().get(&DisplaySlot::new(0)).map(String::as_str),
            Some("DP-1")
        );
    }

    #[test]
    fn test_invalid_connector_keys_are_skipped() {
        let document: ShellDocument = toml::from_str(
            r#"
            [ScreenConnectors]
            0 = "DP-1"
            bogus = "HDMI-1"
            -1 = "eDP-1"
            "#,
        )
        .unwrap();

        let connectors = document.screen_connectors();
        assert_eq!(connectors.len(), 1);
        assert_eq!(connectors.get(&DisplaySlot::new(0)).map(String::as_str), Some("DP-1"));
    }

    #[test]
    fn test_toml_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlStore::open(dir.path().join("shell.toml")).unwrap();
        assert!(store.containment_groups().is_empty());
        assert!(store.screen_connectors().is_empty());
    }

    #[test]
    fn test_toml_store_sync_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shell.toml");

        let mut store = TomlStore::open(&path).unwrap();
        store.write_screen_connector(DisplaySlot::new(0), "DP-1");
        store.write_screen_connector(DisplaySlot::new(1), "HDMI-A-1");
        store.write_containment(&sample_entity());
        store.sync().unwrap();
        assert!(path.exists());

        let reopened = TomlStore::open(&path).unwrap();
        assert_eq!(reopened.screen_connectors().len(), 2);
        assert_eq!(reopened.read_containment(EntityId::new(7)), Some(sample_entity()));
    }

    #[test]
    fn test_toml_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell.toml");
        fs::write(&path, "this is [not toml").unwrap();

        let result = TomlStore::open(&path);
        assert!(matches!(result, Err(StoreError::Decode { .. })));
    }

    #[test]
    fn test_toml_store_clean_sync_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell.toml");
        let mut store = TomlStore::open(&path).unwrap();
        store.sync().unwrap();
        assert!(!path.exists());
    }
}
