//! # r2s
//!
//! Resident rotation revision server binary. Loads settings, wires the
//! collaborators and the optional snapshot store, and serves the HTTP API.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use r2s_core::Pipeline;
use r2s_server::{AppState, ServerConfig};
use r2s_settings::R2sSettings;
use r2s_store::{Database, SnapshotRepo};
use r2s_telemetry::{init_telemetry, TelemetryConfig};

/// Resident rotation revision server.
#[derive(Parser, Debug)]
#[command(name = "r2s", about = "Resident rotation timetable revision server")]
struct Cli {
    /// Settings file (defaults to `~/.r2s/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// SQLite file for snapshots (overrides settings).
    #[arg(long)]
    database_path: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut R2sSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.database_path {
            settings.store.database_path = Some(path.to_string_lossy().into_owned());
        }
    }
}

fn open_store(settings: &R2sSettings) -> Result<Option<SnapshotRepo>> {
    let Some(path) = settings.store.database_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        warn!("no database path configured; snapshot persistence disabled");
        return Ok(None);
    };
    let db = Database::open(Path::new(path), settings.store.pool_size)
        .with_context(|| format!("Failed to open snapshot database at {path}"))?;
    Ok(Some(SnapshotRepo::new(db)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.settings.clone().unwrap_or_else(r2s_settings::settings_path);
    let mut settings = r2s_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    let mut telemetry = TelemetryConfig::from_level_name(&settings.logging.level, settings.logging.json)
        .context("Invalid logging level")?;
    for (module, level) in &settings.logging.modules {
        telemetry = telemetry
            .with_module_level_name(module, level)
            .with_context(|| format!("Invalid logging level for {module}"))?;
    }
    let guard = init_telemetry(&telemetry).context("Failed to initialise logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        filter = guard.directive(),
        json = guard.json(),
        "starting r2s"
    );

    let collaborators =
        r2s_gateway::build_collaborators(&settings.collaborators).context("Failed to configure collaborators")?;
    let snapshots = open_store(&settings)?;
    let state = AppState::new(Pipeline::new(collaborators), snapshots);

    let config = ServerConfig::from(&settings.server);
    let handle = r2s_server::start(&config, state)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    info!(port = handle.port, "r2s server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
