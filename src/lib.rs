mod db;
mod error;
mod link_out;
mod moves;
mod pairing;
mod presenter;
mod scan;
mod settings;
mod utils;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::{io::BufReader, sync::mpsc};
use tokio_util::sync::CancellationToken;

use db::Database;
use pairing::StationController;
use scan::source::{scan_loop, RawScan};
use settings::{StationConfig, StationPaths};

const SCAN_QUEUE_CAPACITY: usize = 32;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) controller: StationController,
    pub(crate) config: StationConfig,
}

/// Runs the kiosk until stdin closes, `!quit` is entered, or Ctrl-C.
pub fn run() -> Result<()> {
    // RUST_LOG still overrides the default level.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Filament station starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let result = runtime.block_on(station());
    // Stdin reads may still be parked on a blocking thread.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn station() -> Result<()> {
    let paths = StationPaths::from_env();
    let config = StationConfig::load_or_init(&paths.config_path)?;
    let db = Database::new(paths.db_path)?;
    info!(
        "Config {} / registry {}",
        paths.config_path.display(),
        db.path().display()
    );
    let seeded = db.seed_locations(config.location_seeds()).await?;
    if seeded > 0 {
        info!("Seeded {seeded} location(s) from config");
    }

    let controller = StationController::new(&config, db.clone());
    controller.start_ticker().await;

    let state = Arc::new(AppState {
        db,
        controller: controller.clone(),
        config,
    });

    let cancel_token = CancellationToken::new();
    let (scan_tx, scan_rx) = mpsc::channel::<RawScan>(SCAN_QUEUE_CAPACITY);

    let scan_task = tokio::spawn(scan_loop(scan_rx, controller.clone(), cancel_token.clone()));
    let notify_task = tokio::spawn(presenter::render_loop(
        controller.subscribe(),
        cancel_token.clone(),
    ));

    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, shutting down");
                    cancel_token.cancel();
                }
                Err(err) => warn!("Failed to listen for Ctrl-C: {err}"),
            }
        });
    }

    println!("{}", presenter::render::describe_snapshot(&controller.snapshot().await));

    presenter::input_loop(
        BufReader::new(tokio::io::stdin()),
        scan_tx,
        state,
        cancel_token.clone(),
    )
    .await;

    // The sender is gone, so the scan loop finishes whatever is queued and exits.
    if let Err(err) = scan_task.await {
        warn!("Scan loop ended abnormally: {err}");
    }
    cancel_token.cancel();
    if let Err(err) = notify_task.await {
        warn!("Presenter ended abnormally: {err}");
    }

    controller.shutdown().await;
    info!("Filament station stopped");
    Ok(())
}
