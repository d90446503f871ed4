//! Catalog collectors feed game records into each refresh cycle.
//!
//! Store-specific manifest parsing lives outside this crate; a store integration implements
//! [`CatalogCollector`] and is registered with the
//! [`SnapshotPublisher`](crate::publisher::SnapshotPublisher). The crate ships
//! [`ManualCollector`] for games the user added by hand.

use thiserror::Error;

use crate::models::{Collection, CustomGameEntry};

/// Errors a collector can report for one cycle.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to parse catalog data: {0}")]
    Parse(String),
}

/// Invocation order of collectors within a cycle. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectorPriority {
    /// Primary storefront libraries
    Storefront,
    /// Manually added entries
    Custom,
}

/// A source of game records.
///
/// `collect` is called synchronously on the refresh worker, once per cycle. Records pushed
/// before an error is returned are kept; the cycle carries on with the next collector.
pub trait CatalogCollector: Send {
    fn name(&self) -> &str;

    fn priority(&self) -> CollectorPriority;

    fn collect(&mut self, out: &mut Collection) -> Result<(), CollectorError>;
}

/// Collector for games added by hand in `SKIF.yaml`.
#[derive(Debug, Clone, Default)]
pub struct ManualCollector {
    entries: Vec<CustomGameEntry>,
}

impl ManualCollector {
    pub fn new(entries: Vec<CustomGameEntry>) -> Self {
        Self { entries }
    }

    /// Push a record for every entry with an executable. Returns how many were pushed.
    fn push_records(&self, out: &mut Collection) -> usize {
        let before = out.len();
        for entry in &self.entries {
            if entry.executable.as_str().is_empty() {
                tracing::warn!("Custom game '{}' has no executable, skipping", entry.name);
                continue;
            }
            out.push(entry.to_record());
        }
        out.len() - before
    }
}

impl CatalogCollector for ManualCollector {
    fn name(&self) -> &str {
        "Custom"
    }

    fn priority(&self) -> CollectorPriority {
        CollectorPriority::Custom
    }

    fn collect(&mut self, out: &mut Collection) -> Result<(), CollectorError> {
        let collected = self.push_records(out);
        tracing::debug!(
            "Custom - {} of {} entries collected",
            collected,
            self.entries.len()
        );
        Ok(())
    }
}

/// Order collectors for invocation: by priority, then registration order.
pub(crate) fn sort_by_priority(collectors: &mut [Box<dyn CatalogCollector>]) {
    // stable sort keeps registration order within a priority
    collectors.sort_by_key(|c| c.priority());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CpuArch, StoreOrigin};
    use camino::Utf8PathBuf;

    struct Named(&'static str, CollectorPriority);

    impl CatalogCollector for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> CollectorPriority {
            self.1
        }

        fn collect(&mut self, _out: &mut Collection) -> Result<(), CollectorError> {
            Ok(())
        }
    }

    fn entry(id: u64, exe: &str) -> CustomGameEntry {
        CustomGameEntry {
            id,
            name: format!("Game {id}"),
            install_dir: None,
            executable: Utf8PathBuf::from(exe),
            arguments: String::new(),
            working_dir: None,
            arch: CpuArch::Any,
        }
    }

    #[test]
    fn test_manual_collector_skips_empty_executables() {
        let mut collector = ManualCollector::new(vec![entry(1, "/a/a.exe"), entry(2, "")]);
        let mut out = Collection::new();

        collector.collect(&mut out).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out.records[0].origin, StoreOrigin::Custom);
    }

    #[test]
    fn test_manual_collector_counts_only_pushed_records() {
        let collector = ManualCollector::new(vec![
            entry(1, "/a/a.exe"),
            entry(2, ""),
            entry(3, "/c/c.exe"),
            entry(4, ""),
        ]);
        let mut out = Collection::new();
        out.push(entry(9, "/z/z.exe").to_record());

        assert_eq!(collector.push_records(&mut out), 2);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_storefront_sorted_before_custom_keeping_registration_order() {
        let mut collectors: Vec<Box<dyn CatalogCollector>> = vec![
            Box::new(Named("custom", CollectorPriority::Custom)),
            Box::new(Named("steam", CollectorPriority::Storefront)),
            Box::new(Named("epic", CollectorPriority::Storefront)),
        ];

        sort_by_priority(&mut collectors);

        let names: Vec<&str> = collectors.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["steam", "epic", "custom"]);
    }
}
