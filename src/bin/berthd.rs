//! berthd - dock placement engine
//!
//! Drives the placement engine against the headless backend. Useful for
//! checking how a layout reacts to a sequence of monitor changes without a
//! running compositor.
//!
//! # Usage
//!
//! ```bash
//! # Replay a scripted topology and print the resulting placement
//! berthd replay scenario.toml
//!
//! # Same, persisting to (and starting from) a configuration file
//! berthd replay scenario.toml --store ~/.local/state/berth/shell.toml
//!
//! # List persisted connector -> slot bindings
//! berthd slots
//! ```
//!
//! # Scenario Format
//!
//! ```toml
//! [[displays]]
//! connector = "DP-1"
//! geometry = { x = 0, y = 0, width = 1920, height = 1080 }
//! primary = true
//!
//! [[steps]]
//! action = "add_display"
//! connector = "DP-2"
//! geometry = { x = 1920, y = 0, width = 2560, height = 1440 }
//!
//! [[steps]]
//! action = "wait"
//! ms = 600
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use berth_core::{AppletId, DisplayInfo, Edge, EntityId, Geometry, PanelEntity};
use berthd::backend::Backend;
use berthd::settings::Settings;
use berthd::shell::{spawn_shell, ShellHandle};
use berthd::sim::{SimDisplays, SimPlugins, SimViews};
use berthd::store::{ConfigStore, MemoryStore, TomlStore};

/// berth dock placement engine
#[derive(Parser, Debug)]
#[command(name = "berthd", version, about)]
struct Args {
    /// Settings file (defaults to $XDG_CONFIG_HOME/berth/berth.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a display scenario against the headless backend
    Replay {
        /// Scenario file
        scenario: PathBuf,

        /// Persist to this configuration file instead of an in-memory store
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// List persisted display slot bindings
    Slots {
        /// Configuration file (defaults to the configured store path)
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

// ============================================================================
// Scenario
// ============================================================================

/// A scripted display topology.
#[derive(Debug, Deserialize)]
struct Scenario {
    /// Displays connected at startup.
    #[serde(default)]
    displays: Vec<DisplayInfo>,

    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Step {
    AddDisplay {
        connector: String,
        geometry: Geometry,
        #[serde(default)]
        primary: bool,
    },
    RemoveDisplay {
        connector: String,
    },
    SetPrimary {
        connector: String,
    },
    /// Lets the debounce window elapse (or not).
    Wait {
        ms: u64,
    },
    AddPanel {
        id: u32,
        #[serde(default)]
        edge: Edge,
        /// Display to put the panel on; the primary one if omitted.
        connector: Option<String>,
    },
    MovePanel {
        id: u32,
        edge: Edge,
    },
    RemoveApplet {
        id: u32,
        applet: u32,
    },
    DestroyPanel {
        id: u32,
    },
}

impl Scenario {
    fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }
}

async fn apply_step(handle: &ShellHandle, displays: &SimDisplays, step: Step) -> Result<()> {
    match step {
        Step::AddDisplay {
            connector,
            geometry,
            primary,
        } => {
            let mut display = DisplayInfo::new(connector, geometry);
            display.primary = primary;
            displays.add(display.clone());
            handle.display_added(display).await;
            handle.display_count_changed().await;
            if primary {
                handle.primary_changed().await;
            }
        }
        Step::RemoveDisplay { connector } => {
            if !displays.remove(&connector) {
                warn!(connector = %connector, "Display not connected, step ignored");
                return Ok(());
            }
            handle.display_removed(connector).await;
            handle.display_count_changed().await;
        }
        Step::SetPrimary { connector } => {
            if !displays.set_primary(&connector) {
                warn!(connector = %connector, "Display not connected, step ignored");
                return Ok(());
            }
            handle.primary_changed().await;
        }
        Step::Wait { ms } => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        Step::AddPanel {
            id,
            edge,
            connector,
        } => {
            let mut entity = PanelEntity::panel(EntityId::new(id)).with_location(edge);
            if let Some(connector) = connector {
                let slot = handle.display_slot_id(connector).await?;
                entity = entity.on_screen(slot);
            }
            if let Err(e) = handle.add_entity(entity).await {
                warn!(entity = id, error = %e, "Panel not placed");
            }
        }
        Step::MovePanel { id, edge } => {
            handle.location_changed(EntityId::new(id), edge).await;
        }
        Step::RemoveApplet { id, applet } => {
            let removed = handle
                .remove_applet(EntityId::new(id), AppletId::new(applet))
                .await?;
            if !removed {
                warn!(entity = id, applet, "Applet not found");
            }
        }
        Step::DestroyPanel { id } => {
            let id = EntityId::new(id);
            handle.destroyed_changed(id, true).await;
            handle.entity_destroyed(id).await;
        }
    }
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let settings = match config {
        Some(path) => {
            let mut settings = Settings::load_from(path)?;
            settings.apply_overrides(|var| std::env::var(var).ok())?;
            settings
        }
        None => Settings::load()?,
    };
    Ok(settings)
}

#[tokio::main]
async fn replay(settings: Settings, scenario: Scenario, store: Option<PathBuf>) -> Result<()> {
    let store: Box<dyn ConfigStore> = match store {
        Some(path) => Box::new(TomlStore::open(path)?),
        None => Box::new(MemoryStore::new()),
    };

    let displays = SimDisplays::new(scenario.displays);
    let views = SimViews::new(displays.clone());
    let backend = Backend {
        displays: Box::new(displays.clone()),
        activities: Box::new(displays.clone()),
        views: Box::new(views),
        plugins: Box::new(SimPlugins::with_defaults()),
        store,
    };

    let cancel = CancellationToken::new();
    let handle = spawn_shell(backend, &settings, cancel.clone());

    info!(steps = scenario.steps.len(), "Replaying scenario");
    for step in scenario.steps {
        apply_step(&handle, &displays, step).await?;
    }

    // Settle whatever the last steps left pending
    if let Err(e) = handle.reconcile_now().await {
        warn!(error = %e, "Final topology pass failed");
    }
    let deleted = handle.clean_config().await?;
    let snapshot = handle.snapshot().await?;

    cancel.cancel();
    while handle.is_connected() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    info!(deleted, "Replay finished");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn list_slots(settings: &Settings, store: Option<PathBuf>) -> Result<()> {
    let path = store.unwrap_or_else(|| settings.store_path.clone());
    let store = TomlStore::open(&path)?;

    let bindings = store.screen_connectors();
    if bindings.is_empty() {
        println!("No display slots bound in {}", path.display());
        return Ok(());
    }

    for (slot, connector) in bindings {
        println!("{slot}\t{connector}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("berthd=info".parse()?)
                .add_directive("berth_core=info".parse()?),
        )
        .init();

    let settings = load_settings(args.config.as_deref())?;

    match args.command {
        Command::Replay { scenario, store } => {
            let scenario = Scenario::load(&scenario)?;
            replay(settings, scenario, store)
        }
        Command::Slots { store } => list_slots(&settings, store),
    }
}
