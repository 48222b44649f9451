//! # rideline
//!
//! Operator binary: logs in as a rider, follows one driver, and prints
//! every position the server pushes until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rideline_client::auth::StaticAuth;
use rideline_client::location::FixedLocation;
use rideline_client::store::FileStore;
use rideline_client::{Lifecycle, PositionListener};
use rideline_core::{DriverId, RemotePositionEvent, RiderId};
use rideline_settings::{ClientSettings, load_settings, load_settings_from_path};
use tracing::{info, warn};

/// rideline streaming client.
#[derive(Parser, Debug)]
#[command(name = "rideline", about = "Follow a driver's live position")]
struct Cli {
    /// Settings file (defaults to `~/.rideline/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect as a rider and print a driver's positions.
    Watch {
        /// Rider identity to register as.
        #[arg(long)]
        rider: String,

        /// Driver to follow.
        #[arg(long)]
        driver: String,

        /// Server URL (overrides settings).
        #[arg(long)]
        server: Option<String>,

        /// Reported rider latitude.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lat: f64,

        /// Reported rider longitude.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        lng: f64,
    },
    /// Print the effective settings as JSON.
    Config,
}

fn load(path: Option<&PathBuf>) -> Result<ClientSettings> {
    match path {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => load_settings().context("Failed to load settings"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load(cli.settings.as_ref())?;

    match cli.command {
        Command::Config => {
            let json = serde_json::to_string_pretty(&settings).context("Failed to encode settings")?;
            println!("{json}");
            Ok(())
        }
        Command::Watch {
            rider,
            driver,
            server,
            lat,
            lng,
        } => {
            if let Some(url) = server {
                settings.server.url = url;
            }
            rideline_core::logging::init_subscriber(&settings.logging.level);
            watch(settings, RiderId::from(rider), DriverId::from(driver), lat, lng).await
        }
    }
}

async fn watch(
    settings: ClientSettings,
    rider: RiderId,
    driver: DriverId,
    lat: f64,
    lng: f64,
) -> Result<()> {
    let cache_dir = settings
        .location
        .cache_dir
        .clone()
        .map_or_else(default_cache_dir, PathBuf::from);
    info!(server = %settings.server.url, cache_dir = %cache_dir.display(), "starting");

    let auth = Arc::new(StaticAuth::logged_in(rider.clone()));
    let lifecycle = Lifecycle::builder(settings, Arc::new(FixedLocation::new(lat, lng)))
        .store(Arc::new(FileStore::new(cache_dir)))
        .auth(auth.clone())
        .build()
        .context("Invalid settings")?;

    let printer: Arc<dyn PositionListener> = Arc::new(|e: &RemotePositionEvent| {
        println!(
            "{} lat={:.6} lng={:.6} heading={:.1}",
            chrono::Utc::now().to_rfc3339(),
            e.latitude,
            e.longitude,
            e.heading_deg
        );
    });
    let _ = lifecycle.add_listener(printer);

    let outcome = lifecycle
        .on_login(rider)
        .await
        .context("Failed to connect")?;
    info!(?outcome, "connected");
    lifecycle
        .on_tracking_focus(driver.clone())
        .await
        .with_context(|| format!("Failed to subscribe to driver {driver}"))?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    if let Err(e) = lifecycle.on_tracking_blur().await {
        warn!(error = %e, "unsubscribe failed during shutdown");
    }
    auth.clear();
    lifecycle.on_logout().await;
    Ok(())
}

fn default_cache_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rideline").join("cache")
}
