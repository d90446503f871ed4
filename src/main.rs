//! SKIF - Special K Injection Frontend
//!
//! Headless entry point. It initializes:
//! - Logging (daily rotating file + console)
//! - Configuration loading ([`ConfigManager`], `SKIF Data/SKIF.yaml`)
//! - Launcher services ([`AppServices`]: refresh worker, resolver, watches, state)
//!
//! and then runs the frame loop on a tokio runtime until Ctrl-C. Each frame polls the
//! watches, reads the newest library without blocking and logs what changed.

use anyhow::{Context, Result};
use skif::{APP_NAME, AppServices, ConfigManager, VERSION};
use std::time::Duration;

const CONFIG_DIR: &str = "SKIF Data";

fn main() -> Result<()> {
    let config_manager = ConfigManager::new(CONFIG_DIR)?;
    let config = config_manager.load_launcher_config()?;

    let _log_guard = skif::logging::setup_logging_with_console(
        &config.settings.log_dir,
        "skif",
        config.settings.debug_mode,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let frame_interval = Duration::from_millis(config.settings.frame_interval_ms.max(1));
    let mut services = AppServices::init(config)?;

    runtime.block_on(frame_loop(&mut services, frame_interval));

    services.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    Ok(())
}

async fn frame_loop(services: &mut AppServices, frame_interval: Duration) {
    let mut interval = tokio::time::interval(frame_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Interrupted, leaving frame loop");
                break;
            }
            _ = interval.tick() => {
                let frame = services.tick();
                if frame.changed {
                    log_library(services, &frame);
                }
            }
        }
    }
}

fn log_library(services: &AppServices, frame: &skif::Frame) {
    let collection = &frame.collection;
    tracing::info!(
        "Library generation {}: {} games",
        collection.generation,
        collection.len()
    );

    for record in collection.iter() {
        let install = services.install_state(record, collection.generation);
        tracing::debug!(
            "[{}] {} ({}): {:?} via {} ({}), config {:?}",
            record.origin.as_str(),
            record.name,
            record.id,
            install.injection_type,
            install.entry_point,
            install.bitness,
            install.config_path()
        );
    }
}
