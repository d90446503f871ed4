//! Change signals that tell the frame loop when to request a library refresh.
//!
//! A [`Watch`] is polled once per frame from the thread that owns it. Polling never blocks and
//! consumes whatever was signaled since the previous poll, so several changes between two
//! frames produce a single `true`.

mod directory;
#[cfg(windows)]
mod registry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use thiserror::Error;

pub use directory::DirectoryWatch;
#[cfg(windows)]
pub use registry::{RegistryRoot, RegistryWatch};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watch target does not exist: {0}")]
    MissingTarget(Utf8PathBuf),

    #[error("Failed to watch {path}: {source}")]
    Notify {
        path: Utf8PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] std::io::Error),
}

/// A pollable change signal.
pub trait Watch {
    /// Label used in logs.
    fn name(&self) -> &str;

    /// Whether anything changed since the last call. Clears the signal.
    fn is_signaled(&mut self) -> bool;
}

/// Signal raised from code rather than by the OS.
///
/// Keep the `ManualSignal` where it is polled and give [`SignalTrigger`]s to whoever raises it.
#[derive(Debug)]
pub struct ManualSignal {
    name: String,
    flag: Arc<AtomicBool>,
}

/// Raising side of a [`ManualSignal`].
#[derive(Debug, Clone)]
pub struct SignalTrigger {
    flag: Arc<AtomicBool>,
}

impl SignalTrigger {
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl ManualSignal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn trigger_handle(&self) -> SignalTrigger {
        SignalTrigger {
            flag: Arc::clone(&self.flag),
        }
    }
}

impl Watch for ManualSignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_signaled(&mut self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

/// Poll every watch and report whether any fired.
///
/// All watches are polled even after one fires so each consumes its pending signal.
pub fn poll_all(watches: &mut [Box<dyn Watch>]) -> bool {
    let mut signaled = false;
    for watch in watches.iter_mut() {
        if watch.is_signaled() {
            tracing::debug!("Watch '{}' signaled", watch.name());
            signaled = true;
        }
    }
    signaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_manual_signal_consumes_on_poll() {
        let mut signal = ManualSignal::new("manual");
        assert!(!signal.is_signaled());

        signal.trigger();
        signal.trigger();
        assert!(signal.is_signaled());
        assert!(!signal.is_signaled());
    }

    #[test]
    fn test_trigger_from_another_thread() {
        let mut signal = ManualSignal::new("manual");
        let trigger = signal.trigger_handle();

        thread::spawn(move || trigger.trigger()).join().unwrap();

        assert!(signal.is_signaled());
    }

    #[test]
    fn test_poll_all_drains_every_watch() {
        let first = ManualSignal::new("first");
        let second = ManualSignal::new("second");
        first.trigger();
        second.trigger();

        let mut watches: Vec<Box<dyn Watch>> = vec![Box::new(first), Box::new(second)];

        assert!(poll_all(&mut watches));
        assert!(!watches[1].is_signaled());
        assert!(!poll_all(&mut watches));
    }
}
