//! Berth Core - Shared types for multi-display dock placement
//!
//! This crate provides the domain types shared between the placement
//! engine (berthd) and anything that inspects its persisted state.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod display;
pub mod edge;
pub mod entity;
pub mod error;
pub mod plugin;

// Re-exports for convenience
pub use display::{DisplayInfo, DisplaySlot, Geometry};
pub use edge::Edge;
pub use entity::{Applet, AppletId, EntityId, PanelEntity, PanelKind};
pub use error::{DomainError, DomainResult};
pub use plugin::{PluginId, DEFAULT_APPLETS, RESERVED_PLUGINS, SHELL_PANEL_PLUGIN};
