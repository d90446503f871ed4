//! Snapshot publisher - background library refresh with lock-free reads.
//!
//! A dedicated worker thread sleeps on a condition variable until
//! [`request_refresh`](SnapshotPublisher::request_refresh) wakes it. Each cycle rebuilds the
//! whole game collection from the registered [`CatalogCollector`]s into a free slot of the
//! [`ring`] and publishes it. The consumer (usually the frame loop) reads the newest collection
//! through a [`SnapshotReader`] without ever blocking.
//!
//! # Usage
//!
//! ```ignore
//! let (mut publisher, mut reader) = SnapshotPublisher::spawn(collectors, options)?;
//! publisher.request_refresh();
//!
//! // Each frame
//! let games = reader.get_latest();
//!
//! publisher.shutdown();
//! ```

pub mod ring;

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime};

use crate::metrics::PublisherMetrics;
use crate::models::{Collection, SpecialKConfig};
use crate::services::collectors::{CatalogCollector, sort_by_priority};
use crate::services::InjectionResolver;

pub use ring::{SLOT_COUNT, SnapshotReader, SnapshotWriter, WriteTicket, select_write_slot};

const WORKER_THREAD_NAME: &str = "skif-refresh";

/// Lifecycle of the refresh worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Parked, waiting for a refresh request
    Idle = 0,
    /// Rebuilding a collection
    Running = 1,
    /// Exited after shutdown
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Settings for [`SnapshotPublisher::spawn`].
#[derive(Debug, Default)]
pub struct PublisherOptions {
    /// When set, every record's injection state is resolved on the worker during finalization
    pub resolver: Option<Arc<InjectionResolver>>,
    pub metrics: Arc<PublisherMetrics>,
    /// Queue one cycle before the worker first parks
    pub refresh_on_start: bool,
}

#[derive(Debug, Default)]
struct Control {
    pending: bool,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    state: AtomicU8,
    metrics: Arc<PublisherMetrics>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        // Control holds two flags; a poisoned lock still has usable values
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn request_refresh(&self) {
        let coalesced = {
            let mut control = self.lock();
            let coalesced = control.pending;
            control.pending = true;
            coalesced
        };
        self.metrics.record_refresh_request(coalesced);
        self.wake.notify_one();
    }
}

/// Cloneable handle that can only ask for a refresh.
///
/// Hand this to code that detects changes (watches, UI actions) on other threads.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    shared: Arc<Shared>,
}

impl RefreshHandle {
    pub fn request_refresh(&self) {
        self.shared.request_refresh();
    }
}

/// Owner of the refresh worker thread.
///
/// Dropping the publisher shuts the worker down and joins it.
#[derive(Debug)]
pub struct SnapshotPublisher {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotPublisher {
    /// Start the worker thread and return the publisher with the matching reader.
    ///
    /// Collectors are ordered by [`priority`](CatalogCollector::priority), keeping registration
    /// order within a priority. The reader initially sees an empty generation 0 collection.
    pub fn spawn(
        mut collectors: Vec<Box<dyn CatalogCollector>>,
        options: PublisherOptions,
    ) -> io::Result<(Self, SnapshotReader)> {
        sort_by_priority(&mut collectors);

        let (writer, reader) = ring::snapshot_ring(Arc::clone(&options.metrics));

        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                pending: options.refresh_on_start,
                shutdown: false,
            }),
            wake: Condvar::new(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            metrics: options.metrics,
        });

        let names: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
        tracing::info!(
            "Starting refresh worker with {} collectors: {:?}",
            collectors.len(),
            names
        );

        let worker = RefreshWorker {
            shared: Arc::clone(&shared),
            writer,
            collectors,
            resolver: options.resolver,
        };

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())?;

        Ok((
            Self {
                shared,
                handle: Some(handle),
            },
            reader,
        ))
    }

    /// Ask the worker for one rebuild cycle. Never blocks on a running cycle.
    ///
    /// Requests made while a cycle is already pending or running fold into a single extra cycle.
    pub fn request_refresh(&self) {
        self.shared.request_refresh();
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        RefreshHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn worker_state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn metrics(&self) -> &Arc<PublisherMetrics> {
        &self.shared.metrics
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// A cycle already running completes and is published; pending requests are dropped.
    /// Calling this more than once is harmless.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();

        if handle.join().is_err() {
            tracing::error!("Refresh worker thread panicked");
            self.shared.set_state(WorkerState::Stopped);
        }
        tracing::debug!("Refresh worker joined");
    }
}

impl Drop for SnapshotPublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct RefreshWorker {
    shared: Arc<Shared>,
    writer: SnapshotWriter,
    collectors: Vec<Box<dyn CatalogCollector>>,
    resolver: Option<Arc<InjectionResolver>>,
}

impl RefreshWorker {
    fn run(mut self) {
        tracing::debug!("Refresh worker started");

        while self.wait_for_request() {
            self.shared.set_state(WorkerState::Running);
            self.run_cycle();
            self.shared.set_state(WorkerState::Idle);
        }

        self.shared.set_state(WorkerState::Stopped);
        tracing::debug!("Refresh worker stopped");
    }

    /// Park until there is work. Returns `false` once shutdown was requested.
    fn wait_for_request(&self) -> bool {
        let mut control = self.shared.lock();
        while !control.pending && !control.shutdown {
            control = self
                .shared
                .wake
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if control.shutdown {
            return false;
        }
        control.pending = false;
        true
    }

    fn run_cycle(&mut self) {
        let started = Instant::now();
        let metrics = &self.shared.metrics;
        let collectors = &mut self.collectors;
        let resolver = self.resolver.as_deref();
        let mut published = 0;

        let ticket = self.writer.write_with(|out| {
            for collector in collectors.iter_mut() {
                run_collector(collector.as_mut(), out, metrics);
            }
            finalize(out, resolver);
            published = out.len();
        });

        let elapsed = started.elapsed();
        metrics.record_cycle(published, elapsed);

        tracing::debug!(
            "Published generation {} in slot {} ({} records, {:.1}ms)",
            ticket.generation,
            ticket.slot,
            published,
            elapsed.as_secs_f64() * 1000.0
        );
    }
}

/// Run one collector, isolating the cycle from its failures.
///
/// Records pushed before an error are kept. Records pushed before a panic are discarded.
fn run_collector(
    collector: &mut dyn CatalogCollector,
    out: &mut Collection,
    metrics: &PublisherMetrics,
) {
    let before = out.len();

    match panic::catch_unwind(AssertUnwindSafe(|| collector.collect(out))) {
        Ok(Ok(())) => {
            tracing::debug!(
                "{} - collected {} records",
                collector.name(),
                out.len() - before
            );
        }
        Ok(Err(e)) => {
            metrics.record_collector_failure();
            tracing::warn!(
                "{} - collector failed after {} records: {}",
                collector.name(),
                out.len() - before,
                e
            );
        }
        Err(payload) => {
            out.records.truncate(before);
            metrics.record_collector_panic();
            tracing::error!(
                "{} - collector panicked, output discarded: {}",
                collector.name(),
                panic_message(payload.as_ref())
            );
        }
    }
}

/// Stamp validity and check time on every record, and resolve injection state if configured.
fn finalize(collection: &mut Collection, resolver: Option<&InjectionResolver>) {
    let now = SystemTime::now();
    let batch = resolver.map(InjectionResolver::batch);

    for record in &mut collection.records {
        for launch in &mut record.launch_configs {
            launch.valid = !launch.executable.as_str().is_empty() && launch.executable.is_file();
        }
        record.client.last_checked = Some(now);

        if let (Some(resolver), Some(batch)) = (resolver, &batch) {
            let profile_dir = resolver.profile_dir(record);
            let injection = batch.resolve(record);
            record.specialk = SpecialKConfig {
                profile_dir: Some(profile_dir),
                injection: Some(injection),
            };
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
