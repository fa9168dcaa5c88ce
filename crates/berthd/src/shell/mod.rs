//! Shell event loop using the Actor pattern.
//!
//! The reconciler is not thread-safe and does not need to be: it lives
//! inside a single actor task that processes commands one at a time. The
//! windowing layer, the configuration layer and any client talk to it
//! through a [`ShellHandle`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Windowing layer │────▶│   ShellActor    │────▶│ Broadcast Channel│
//! │  Config layer   │     │  (Reconciler)   │     │   (ShellEvent)   │
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                        │
//!         │   ShellCommand        │  debounce timer        │
//!         │   (mpsc channel)      │  (reset per change)    │
//!         ▼                       ▼                        ▼
//!   display hotplug,        one topology pass       dock count, entity
//!   entity notifications    per burst               and picker events
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

mod actor;
mod commands;
mod handle;

pub use actor::ShellActor;
pub use commands::{ShellCommand, ShellEvent, TopologyChange};
pub use handle::ShellHandle;

use crate::backend::Backend;
use crate::reconciler::Reconciler;
use crate::settings::Settings;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawn the shell actor and return a handle for interaction.
///
/// This function:
/// 1. Creates command and event channels
/// 2. Builds the reconciler around `backend`
/// 3. Spawns the actor on a tokio task; it loads the layout right away
///    if the activity service is already running
///
/// The actor stops when `cancel` fires or every handle is dropped, after
/// cleaning the configuration and releasing all views.
///
/// # Example
///
/// ```no_run
/// use berthd::shell::spawn_shell;
/// # use berthd::backend::Backend;
/// # use berthd::settings::Settings;
/// # use tokio_util::sync::CancellationToken;
///
/// # async fn run(backend: Backend) {
/// let handle = spawn_shell(backend, &Settings::default(), CancellationToken::new());
/// handle.display_count_changed().await;
/// let snapshot = handle.snapshot().await;
/// # }
/// ```
pub fn spawn_shell(backend: Backend, settings: &Settings, cancel: CancellationToken) -> ShellHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let reconciler = Reconciler::new(backend, event_tx.clone(), settings.default_applet_ids());
    let actor = ShellActor::new(reconciler, cmd_rx, settings.debounce(), cancel);
    tokio::spawn(actor.run());

    ShellHandle::new(cmd_tx, event_tx)
}
