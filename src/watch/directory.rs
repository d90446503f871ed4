use std::sync::mpsc;
use std::time::Duration;

use camino::Utf8Path;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};

use super::{Watch, WatchError};

/// Default quiet period before a burst of filesystem events is reported.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Signals when anything inside a directory changes.
///
/// Used for storefront manifest folders and the launcher's own profile tree.
pub struct DirectoryWatch {
    name: String,
    rx: mpsc::Receiver<DebounceEventResult>,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl DirectoryWatch {
    /// Watch `dir` and everything below it.
    pub fn new(dir: impl AsRef<Utf8Path>) -> Result<Self, WatchError> {
        Self::with_options(dir, RecursiveMode::Recursive, DEFAULT_DEBOUNCE)
    }

    pub fn with_options(
        dir: impl AsRef<Utf8Path>,
        mode: RecursiveMode,
        debounce: Duration,
    ) -> Result<Self, WatchError> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(WatchError::MissingTarget(dir.to_path_buf()));
        }

        let notify_err = |source: notify::Error| WatchError::Notify {
            path: dir.to_path_buf(),
            source,
        };

        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(debounce, tx).map_err(notify_err)?;
        debouncer
            .watcher()
            .watch(dir.as_std_path(), mode)
            .map_err(notify_err)?;

        tracing::debug!("Watching {} ({:?})", dir, mode);

        Ok(Self {
            name: dir.to_string(),
            rx,
            _debouncer: debouncer,
        })
    }
}

impl Watch for DirectoryWatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_signaled(&mut self) -> bool {
        let mut signaled = false;

        while let Ok(result) = self.rx.try_recv() {
            match result {
                Ok(events) => signaled |= !events.is_empty(),
                Err(e) => tracing::warn!("Watch error on {}: {}", self.name, e),
            }
        }

        signaled
    }
}
