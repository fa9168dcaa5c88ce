//! Engine errors.
//!
//! None of these are fatal. The engine logs them and degrades to the best
//! placement it can find; callers mostly see them as outcomes of a request.

use berth_core::{EntityId, PluginId};
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the placement engine.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The entity's backing package could not be resolved. Not retried.
    #[error("plugin {plugin} for entity {entity} can not be located or loaded")]
    InvalidPlugin { entity: EntityId, plugin: PluginId },

    /// The entity's plugin is a reserved internal type that never gets a
    /// view of its own.
    #[error("entity {entity} uses reserved plugin {plugin}")]
    ReservedPlugin { entity: EntityId, plugin: PluginId },

    /// No display could be determined this cycle. Retried on the next
    /// topology change.
    #[error("no display resolved for entity {0}")]
    UnresolvedTarget(EntityId),

    /// The windowing layer reports no displays at all.
    #[error("no displays available")]
    NoDisplaysAvailable,

    /// Removal of the sole remaining view was refused; the view follows
    /// the primary display instead.
    #[error("entity {0} holds the last view and was redirected to the primary display")]
    LastViewProtection(EntityId),

    /// The requested entity is not known.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the shell actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,

    /// Persisting configuration failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
