//! Service wiring for the launcher.
//!
//! [`AppServices`] owns every long-lived component and is created once at startup with
//! [`init`](AppServices::init) and torn down with [`shutdown`](AppServices::shutdown).
//! The frame loop calls [`tick`](AppServices::tick) once per frame.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::LauncherPaths;
use crate::metrics::PublisherMetrics;
use crate::models::{Collection, GameRecord, InstallState, LauncherConfig};
use crate::publisher::{PublisherOptions, SnapshotPublisher, SnapshotReader, WorkerState};
use crate::services::{CatalogCollector, DiskProbe, FileProbe, InjectionResolver, ManualCollector};
use crate::state::StateManager;
use crate::watch::{DirectoryWatch, ManualSignal, SignalTrigger, Watch, poll_all};

/// Result of one frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Newest complete library
    pub collection: Arc<Collection>,
    /// Whether `collection` is newer than the previous frame's
    pub changed: bool,
    /// Whether a watch fired and a refresh was requested
    pub refresh_requested: bool,
}

/// Long-lived launcher services.
pub struct AppServices {
    config: LauncherConfig,
    resolver: Arc<InjectionResolver>,
    metrics: Arc<PublisherMetrics>,
    state: StateManager,
    publisher: SnapshotPublisher,
    reader: SnapshotReader,
    watches: Vec<Box<dyn Watch>>,
    manual_refresh: SignalTrigger,
}

impl AppServices {
    /// Start all services with the real filesystem probe and the custom-games collector.
    pub fn init(config: LauncherConfig) -> Result<Self> {
        Self::init_with(config, Arc::new(DiskProbe::new()), Vec::new())
    }

    /// Start all services with a specific probe and extra store collectors.
    ///
    /// The first refresh is queued immediately. Watch directories that cannot be watched are
    /// logged and skipped.
    pub fn init_with(
        config: LauncherConfig,
        probe: Arc<dyn FileProbe>,
        store_collectors: Vec<Box<dyn CatalogCollector>>,
    ) -> Result<Self> {
        let paths = LauncherPaths::from_settings(&config.settings)
            .context("Failed to resolve launcher directories")?;
        let resolver = Arc::new(InjectionResolver::new(paths, probe));
        let metrics = Arc::new(PublisherMetrics::new());

        let mut collectors = store_collectors;
        collectors.push(Box::new(ManualCollector::new(config.custom_games.clone())));

        let options = PublisherOptions {
            resolver: config
                .settings
                .resolve_on_refresh
                .then(|| Arc::clone(&resolver)),
            metrics: Arc::clone(&metrics),
            refresh_on_start: true,
        };
        let (publisher, reader) = SnapshotPublisher::spawn(collectors, options)
            .context("Failed to start the refresh worker")?;

        let manual = ManualSignal::new("manual refresh");
        let manual_refresh = manual.trigger_handle();
        let mut watches: Vec<Box<dyn Watch>> = vec![Box::new(manual)];

        for dir in &config.settings.watch_dirs {
            match DirectoryWatch::new(dir) {
                Ok(watch) => watches.push(Box::new(watch)),
                Err(e) => tracing::warn!("Not watching {}: {}", dir, e),
            }
        }

        tracing::info!(
            "Services initialized: {} watches, resolve on refresh: {}",
            watches.len(),
            config.settings.resolve_on_refresh
        );

        Ok(Self {
            config,
            resolver,
            metrics,
            state: StateManager::new(),
            publisher,
            reader,
            watches,
            manual_refresh,
        })
    }

    /// Register an additional change signal.
    pub fn add_watch(&mut self, watch: Box<dyn Watch>) {
        self.watches.push(watch);
    }

    /// Poll watches, read the newest library and feed it to the state manager.
    pub fn tick(&mut self) -> Frame {
        let refresh_requested = poll_all(&mut self.watches);
        if refresh_requested {
            self.publisher.request_refresh();
        }

        let collection = self.reader.get_latest();
        let changed = !self.state.apply_collection(&collection).is_empty();

        Frame {
            collection,
            changed,
            refresh_requested,
        }
    }

    /// Install state of a record from the current library, memoized per generation.
    pub fn install_state(&self, record: &GameRecord, generation: u64) -> InstallState {
        self.state
            .install_state(record, generation, |r| self.resolver.resolve(r))
    }

    /// Trigger that queues a refresh on the next frame. Safe to use from any thread.
    pub fn refresh_trigger(&self) -> SignalTrigger {
        self.manual_refresh.clone()
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<InjectionResolver> {
        &self.resolver
    }

    pub fn metrics(&self) -> &Arc<PublisherMetrics> {
        &self.metrics
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn worker_state(&self) -> WorkerState {
        self.publisher.worker_state()
    }

    /// Stop the refresh worker and log the metrics summary.
    pub fn shutdown(mut self) {
        tracing::info!("Shutting down services");
        self.publisher.shutdown();
        self.metrics.log_summary();
    }
}
