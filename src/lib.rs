// SKIF - Special K Injection Frontend core
//
// This is the library crate: the background library refresh pipeline, the injection strategy
// resolver and the change watches the launcher frame loop polls.
// The binary crate (main.rs) runs the frame loop.

pub mod app;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod publisher;
pub mod services;
pub mod state;
pub mod watch;

// Re-export commonly used types for convenience
pub use app::{AppServices, Frame};
pub use config::{ConfigManager, LauncherPaths};
pub use metrics::PublisherMetrics;
pub use models::{Collection, GameRecord, InstallState, LauncherConfig};
pub use publisher::{SnapshotPublisher, SnapshotReader, WorkerState};
pub use services::InjectionResolver;
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
