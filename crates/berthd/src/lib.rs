//! berth engine - display topology reconciliation for dock views
//!
//! This crate keeps one live dock view per panel entity on the right
//! display while monitors come and go:
//! - `screens` - stable connector -> slot bindings
//! - `edges` - free screen edges per display
//! - `lifecycle` - entity -> live view tables and two-phase destruction
//! - `reconciler` - display resolution and the topology pass
//! - `shell` - event loop actor with the debounced topology pass
//! - `store` - persisted configuration (TOML file or in memory)
//! - `sim` - headless collaborators for replay and tests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        berthd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  ShellHandle    │────▶│     ShellActor              │   │
//! │  │ (notifications) │     │  (Reconciler owner)         │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │                   │
//! │           ┌─────────────────┬───────────┴──────┐            │
//! │           ▼                 ▼                  ▼            │
//! │  ┌────────────────┐ ┌──────────────┐ ┌──────────────────┐  │
//! │  │ ScreenRegistry │ │ ViewLifecycle│ │ broadcast::Sender│  │
//! │  │ (slots)        │ │ (views)      │ │ (ShellEvent)     │  │
//! │  └────────────────┘ └──────────────┘ └──────────────────┘  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod backend;
pub mod edges;
pub mod error;
pub mod lifecycle;
pub mod reconciler;
pub mod screens;
pub mod settings;
pub mod shell;
pub mod sim;
pub mod store;

pub use error::ShellError;
pub use reconciler::{ReconcileReport, Reconciler, ShellSnapshot};
pub use shell::{spawn_shell, ShellEvent, ShellHandle};
