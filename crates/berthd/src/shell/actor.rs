//! Shell actor - owns the reconciler and serializes every notification.
//!
//! Display hotplug notifications do not reconcile right away. They arm a
//! debounce deadline, and every further notification pushes the deadline
//! back, so a burst of hotplug signals collapses into a single pass.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored (the caller may have gone away)

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::{ShellCommand, TopologyChange};
use crate::error::ShellError;
use crate::reconciler::{ReconcileReport, Reconciler};

/// The shell actor.
///
/// Runs in a single task and processes commands sequentially; a topology
/// pass never overlaps with another command.
pub struct ShellActor {
    reconciler: Reconciler,

    /// Command receiver
    receiver: mpsc::Receiver<ShellCommand>,

    /// Quiet period before a topology pass runs.
    debounce: Duration,

    /// When the pending topology pass fires, if one is pending.
    deadline: Option<Instant>,

    cancel: CancellationToken,
}

impl ShellActor {
    pub fn new(
        reconciler: Reconciler,
        receiver: mpsc::Receiver<ShellCommand>,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            receiver,
            debounce,
            deadline: None,
            cancel,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Loads the layout if the activity service is already up, then
    /// processes commands until cancelled or until every handle is dropped.
    pub async fn run(mut self) {
        info!(debounce_ms = self.debounce.as_millis() as u64, "Shell actor starting");
        self.reconciler.load();

        let cancel = self.cancel.clone();
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Shell actor cancelled");
                    break;
                }

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    let _ = self.run_pass();
                }
            }
        }

        self.reconciler.shutdown();
        info!(views = self.reconciler.live_view_count(), "Shell actor stopped");
    }

    /// Pushes the pending pass back by one debounce window.
    fn arm(&mut self) {
        let restarted = self.deadline.is_some();
        self.deadline = Some(Instant::now() + self.debounce);
        debug!(restarted, "Topology pass scheduled");
    }

    fn run_pass(&mut self) -> Result<ReconcileReport, ShellError> {
        if !self.reconciler.is_loaded() {
            debug!("Layout not loaded, skipping topology pass");
            return Ok(ReconcileReport::default());
        }

        let result = self.reconciler.reconcile_displays();
        if let Err(e) = &result {
            warn!(error = %e, "Topology pass deferred");
        }
        result
    }

    /// Dispatches a command to the reconciler.
    fn handle_command(&mut self, cmd: ShellCommand) {
        match cmd {
            ShellCommand::Topology(change) => self.handle_topology(change),
            ShellCommand::ActivitiesReady => {
                if self.reconciler.load() {
                    info!("Layout loaded after activity service came up");
                }
            }
            ShellCommand::AddEntity { entity, respond_to } => {
                let result = self.reconciler.add_entity(*entity);
                let _ = respond_to.send(result);
            }
            ShellCommand::DestroyedChanged { entity, destroyed } => {
                self.reconciler.destroyed_changed(entity, destroyed);
            }
            ShellCommand::EntityDestroyed { entity } => {
                self.reconciler.entity_destroyed(entity);
            }
            ShellCommand::LocationChanged { entity, edge } => {
                self.reconciler.location_changed(entity, edge);
            }
            ShellCommand::AlternativesRequested { entity, applet } => {
                self.reconciler.alternatives_requested(entity, applet);
            }
            ShellCommand::SetEntityScreen {
                entity,
                slot,
                respond_to,
            } => {
                let result = self.reconciler.set_entity_screen(entity, slot);
                let _ = respond_to.send(result);
            }
            ShellCommand::RemoveApplet {
                entity,
                applet,
                respond_to,
            } => {
                let result = self.reconciler.remove_applet(entity, applet);
                let _ = respond_to.send(result);
            }
            ShellCommand::FreeEdges { slot, respond_to } => {
                let _ = respond_to.send(self.reconciler.free_edges(slot));
            }
            ShellCommand::DisplaySlotId {
                connector,
                respond_to,
            } => {
                let _ = respond_to.send(self.reconciler.display_slot_id(&connector));
            }
            ShellCommand::DocksCount { slot, respond_to } => {
                let _ = respond_to.send(self.reconciler.docks_count(slot));
            }
            ShellCommand::PrimarySlot { respond_to } => {
                let _ = respond_to.send(self.reconciler.primary_slot());
            }
            ShellCommand::ScreenGeometry { slot, respond_to } => {
                let _ = respond_to.send(self.reconciler.screen_geometry(slot));
            }
            ShellCommand::AvailableScreenRect { slot, respond_to } => {
                let _ = respond_to.send(self.reconciler.available_screen_rect(slot));
            }
            ShellCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.reconciler.snapshot());
            }
            ShellCommand::ReconcileNow { respond_to } => {
                self.deadline = None;
                let _ = respond_to.send(self.run_pass());
            }
            ShellCommand::CleanConfig { respond_to } => {
                let result = self.reconciler.clean_config().map_err(ShellError::from);
                let _ = respond_to.send(result);
            }
        }
    }

    fn handle_topology(&mut self, change: TopologyChange) {
        match change {
            TopologyChange::Added(display) => {
                self.reconciler.display_added(&display);
                self.arm();
            }
            TopologyChange::Removed { connector } => {
                self.reconciler.display_removed(&connector);
                self.arm();
            }
            TopologyChange::CountChanged => self.arm(),
            TopologyChange::PrimaryChanged => {
                if self.reconciler.primary_output_changed() {
                    self.arm();
                }
            }
        }
    }
}
