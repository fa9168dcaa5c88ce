//! Shell actor commands and events.
//!
//! - `ShellCommand`: messages sent to the actor
//! - `ShellEvent`: notifications published to subscribers
//!
//! Fire-and-forget commands carry notifications from the windowing and
//! configuration layers. Request commands carry a oneshot sender for the
//! reply, so callers can await a result without blocking the loop.

use berth_core::{AppletId, DisplayInfo, DisplaySlot, Edge, EntityId, Geometry, PanelEntity};
use tokio::sync::oneshot;

use crate::error::ShellError;
use crate::lifecycle::AttachOutcome;
use crate::reconciler::{ReconcileReport, ShellSnapshot};

// ============================================================================
// Topology Changes
// ============================================================================

/// Display-set notifications from the windowing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyChange {
    /// A display was plugged in.
    Added(DisplayInfo),
    /// A display was unplugged.
    Removed { connector: String },
    /// The number of displays changed.
    CountChanged,
    /// Another display became primary.
    PrimaryChanged,
}

// ============================================================================
// Shell Commands
// ============================================================================

/// Commands sent to the shell actor.
#[derive(Debug)]
pub enum ShellCommand {
    /// Display hotplug notification. Arms (or re-arms) the debounced pass.
    Topology(TopologyChange),

    /// The activity service reported itself running. Triggers the
    /// deferred layout load.
    ActivitiesReady,

    /// A new entity became known to the configuration layer.
    ///
    /// The entity is boxed to reduce enum size variance.
    AddEntity {
        entity: Box<PanelEntity>,
        respond_to: oneshot::Sender<Result<AttachOutcome, ShellError>>,
    },

    /// First phase of destruction (`true`) or its cancellation (`false`).
    DestroyedChanged { entity: EntityId, destroyed: bool },

    /// Final destruction of an entity.
    EntityDestroyed { entity: EntityId },

    /// The entity's requested edge changed.
    LocationChanged { entity: EntityId, edge: Edge },

    /// An applet asked for the alternatives picker.
    AlternativesRequested { entity: EntityId, applet: AppletId },

    /// The configuration layer reassigned an entity to another slot.
    SetEntityScreen {
        entity: EntityId,
        slot: DisplaySlot,
        respond_to: oneshot::Sender<Result<(), ShellError>>,
    },

    /// An applet was removed from an entity.
    RemoveApplet {
        entity: EntityId,
        applet: AppletId,
        respond_to: oneshot::Sender<Result<bool, ShellError>>,
    },

    /// Free edges of a slot (sentinel = primary).
    FreeEdges {
        slot: DisplaySlot,
        respond_to: oneshot::Sender<Vec<Edge>>,
    },

    /// Slot of a connector, binding it if new.
    DisplaySlotId {
        connector: String,
        respond_to: oneshot::Sender<DisplaySlot>,
    },

    /// Number of live views on a slot.
    DocksCount {
        slot: DisplaySlot,
        respond_to: oneshot::Sender<usize>,
    },

    PrimarySlot {
        respond_to: oneshot::Sender<DisplaySlot>,
    },

    ScreenGeometry {
        slot: DisplaySlot,
        respond_to: oneshot::Sender<Geometry>,
    },

    AvailableScreenRect {
        slot: DisplaySlot,
        respond_to: oneshot::Sender<Geometry>,
    },

    Snapshot {
        respond_to: oneshot::Sender<ShellSnapshot>,
    },

    /// Runs any pending debounced pass immediately.
    ReconcileNow {
        respond_to: oneshot::Sender<Result<ReconcileReport, ShellError>>,
    },

    /// Configuration garbage collection. Replies with the number of
    /// deleted groups.
    CleanConfig {
        respond_to: oneshot::Sender<Result<usize, ShellError>>,
    },
}

// ============================================================================
// Shell Events
// ============================================================================

/// Events published by the shell to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// A panel entity became known.
    EntityAdded { entity: EntityId },

    /// The number of active views changed.
    DockCountChanged { count: usize },

    /// An entity moved to another edge.
    LocationChanged { entity: EntityId, edge: Edge },

    /// The picker UI should offer alternatives for an applet.
    AlternativesRequested { entity: EntityId, applet: AppletId },

    /// A topology pass finished.
    TopologyReconciled { displays: usize, views: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::Geometry;

    #[test]
    fn test_event_variants_clone() {
        let events = vec![
            ShellEvent::EntityAdded {
                entity: EntityId::new(1),
            },
            ShellEvent::DockCountChanged { count: 2 },
            ShellEvent::LocationChanged {
                entity: EntityId::new(1),
                edge: Edge::Left,
            },
            ShellEvent::AlternativesRequested {
                entity: EntityId::new(1),
                applet: AppletId::new(3),
            },
            ShellEvent::TopologyReconciled {
                displays: 2,
                views: 1,
            },
        ];
        let cloned = events.clone();
        assert_eq!(events, cloned);
    }

    #[test]
    fn test_topology_change_carries_display() {
        let change = TopologyChange::Added(DisplayInfo::new("DP-1", Geometry::new(0, 0, 800, 600)));
        match change {
            TopologyChange::Added(display) => assert_eq!(display.connector, "DP-1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_oneshot_pattern() {
        let (tx, rx) = oneshot::channel::<Result<(), ShellError>>();

        tokio::spawn(async move {
            tx.send(Err(ShellError::NoDisplaysAvailable)).ok();
        });

        let result = rx.await.unwrap();
        assert!(matches!(result, Err(ShellError::NoDisplaysAvailable)));
    }
}
