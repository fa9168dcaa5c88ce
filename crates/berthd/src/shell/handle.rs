//! Client interface for interacting with the ShellActor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `ShellError::ChannelClosed`

use berth_core::{AppletId, DisplayInfo, DisplaySlot, Edge, EntityId, Geometry, PanelEntity};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{ShellCommand, ShellEvent, TopologyChange};
use crate::error::ShellError;
use crate::lifecycle::AttachOutcome;
use crate::reconciler::{ReconcileReport, ShellSnapshot};

// ============================================================================
// Shell Handle
// ============================================================================

/// Handle for interacting with the shell actor.
///
/// Cheap to clone. Notification methods are fire-and-forget; query and
/// request methods wait for the actor's reply.
///
/// # Usage
///
/// ```ignore
/// handle.display_added(display).await;
/// let edges = handle.free_edges(DisplaySlot::UNASSIGNED).await?;
///
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct ShellHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<ShellCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<ShellEvent>,
}

impl ShellHandle {
    pub fn new(sender: mpsc::Sender<ShellCommand>, event_sender: broadcast::Sender<ShellEvent>) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends a notification, ignoring a closed actor.
    async fn notify(&self, cmd: ShellCommand) {
        // Fire-and-forget: the actor may be shutting down
        let _ = self.sender.send(cmd).await;
    }

    /// Sends a request built around a fresh reply channel and waits for
    /// the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ShellCommand,
    ) -> Result<T, ShellError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| ShellError::ChannelClosed)?;

        rx.await.map_err(|_| ShellError::ChannelClosed)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    pub async fn display_added(&self, display: DisplayInfo) {
        self.notify(ShellCommand::Topology(TopologyChange::Added(display)))
            .await;
    }

    pub async fn display_removed(&self, connector: impl Into<String>) {
        self.notify(ShellCommand::Topology(TopologyChange::Removed {
            connector: connector.into(),
        }))
        .await;
    }

    pub async fn display_count_changed(&self) {
        self.notify(ShellCommand::Topology(TopologyChange::CountChanged))
            .await;
    }

    pub async fn primary_changed(&self) {
        self.notify(ShellCommand::Topology(TopologyChange::PrimaryChanged))
            .await;
    }

    /// The activity service is running; loads the layout if it was deferred.
    pub async fn activities_ready(&self) {
        self.notify(ShellCommand::ActivitiesReady).await;
    }

    pub async fn destroyed_changed(&self, entity: EntityId, destroyed: bool) {
        self.notify(ShellCommand::DestroyedChanged { entity, destroyed })
            .await;
    }

    pub async fn entity_destroyed(&self, entity: EntityId) {
        self.notify(ShellCommand::EntityDestroyed { entity }).await;
    }

    pub async fn location_changed(&self, entity: EntityId, edge: Edge) {
        self.notify(ShellCommand::LocationChanged { entity, edge })
            .await;
    }

    pub async fn alternatives_requested(&self, entity: EntityId, applet: AppletId) {
        self.notify(ShellCommand::AlternativesRequested { entity, applet })
            .await;
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Registers a new entity and attaches its view.
    ///
    /// # Errors
    ///
    /// - `ShellError::InvalidPlugin` / `ShellError::ReservedPlugin` from attach
    /// - `ShellError::UnresolvedTarget` if its display is not connected
    /// - `ShellError::NoDisplaysAvailable` if no display is connected
    /// - `ShellError::ChannelClosed` if the actor has shut down
    pub async fn add_entity(&self, entity: PanelEntity) -> Result<AttachOutcome, ShellError> {
        self.request(|respond_to| ShellCommand::AddEntity {
            entity: Box::new(entity),
            respond_to,
        })
        .await?
    }

    /// Moves an entity to another display slot.
    ///
    /// # Errors
    ///
    /// - `ShellError::EntityNotFound` if the entity is unknown
    /// - `ShellError::ChannelClosed` if the actor has shut down
    pub async fn set_entity_screen(&self, entity: EntityId, slot: DisplaySlot) -> Result<(), ShellError> {
        self.request(|respond_to| ShellCommand::SetEntityScreen {
            entity,
            slot,
            respond_to,
        })
        .await?
    }

    /// Removes an applet. Returns whether the entity had it.
    pub async fn remove_applet(&self, entity: EntityId, applet: AppletId) -> Result<bool, ShellError> {
        self.request(|respond_to| ShellCommand::RemoveApplet {
            entity,
            applet,
            respond_to,
        })
        .await?
    }

    /// Runs the topology pass now instead of waiting out the debounce.
    pub async fn reconcile_now(&self) -> Result<ReconcileReport, ShellError> {
        self.request(|respond_to| ShellCommand::ReconcileNow { respond_to })
            .await?
    }

    /// Deletes obsolete configuration groups. Returns how many went.
    pub async fn clean_config(&self) -> Result<usize, ShellError> {
        self.request(|respond_to| ShellCommand::CleanConfig { respond_to })
            .await?
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn free_edges(&self, slot: DisplaySlot) -> Result<Vec<Edge>, ShellError> {
        self.request(|respond_to| ShellCommand::FreeEdges { slot, respond_to })
            .await
    }

    pub async fn display_slot_id(&self, connector: impl Into<String>) -> Result<DisplaySlot, ShellError> {
        let connector = connector.into();
        self.request(|respond_to| ShellCommand::DisplaySlotId {
            connector,
            respond_to,
        })
        .await
    }

    /// Live views on `slot`.
    pub async fn docks_count(&self, slot: DisplaySlot) -> Result<usize, ShellError> {
        self.request(|respond_to| ShellCommand::DocksCount { slot, respond_to })
            .await
    }

    pub async fn primary_slot(&self) -> Result<DisplaySlot, ShellError> {
        self.request(|respond_to| ShellCommand::PrimarySlot { respond_to })
            .await
    }

    pub async fn screen_geometry(&self, slot: DisplaySlot) -> Result<Geometry, ShellError> {
        self.request(|respond_to| ShellCommand::ScreenGeometry { slot, respond_to })
            .await
    }

    pub async fn available_screen_rect(&self, slot: DisplaySlot) -> Result<Geometry, ShellError> {
        self.request(|respond_to| ShellCommand::AvailableScreenRect { slot, respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<ShellSnapshot, ShellError> {
        self.request(|respond_to| ShellCommand::Snapshot { respond_to })
            .await
    }

    /// Subscribe to shell events.
    pub fn subscribe(&self) -> broadcast::Receiver<ShellEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
