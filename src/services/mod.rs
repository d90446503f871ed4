//! Services module - framework-agnostic logic behind the launcher.
//!
//! # Components
//!
//! - [`InjectionResolver`]: decides how Special K attaches to a game (bitness, entry point,
//!   local vs. global injection, config location)
//! - [`FileProbe`] / [`DiskProbe`]: the resolver's only view of the filesystem
//! - [`CatalogCollector`] / [`ManualCollector`]: sources of game records for refresh cycles
//!
//! Nothing in here holds shared mutable state. The resolver and probes can be called from any
//! thread; collectors are owned by the refresh worker.

pub mod collectors;
pub mod probe;
pub mod resolver;

pub use collectors::{CatalogCollector, CollectorError, CollectorPriority, ManualCollector};
pub use probe::{DiskProbe, FileProbe, ProbeError};
pub use resolver::{InjectionResolver, ResolveBatch, sanitize_game_name};
