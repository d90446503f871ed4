//! Data models for the SKIF core.
//!
//! - [`GameRecord`], [`LaunchConfig`], [`ClientState`], [`SpecialKConfig`]: one detected title
//! - [`Collection`]: every record gathered in one refresh cycle
//! - [`InstallState`]: resolver output describing how Special K attaches to a game
//! - [`LauncherConfig`]: launcher settings and manual game entries loaded from `SKIF.yaml`
//!
//! Records are plain owned values. Each snapshot slot of the
//! [`SnapshotPublisher`](crate::publisher::SnapshotPublisher) holds its own copy, so nothing here
//! needs interior mutability.

pub mod config;
pub mod game;
pub mod install;

pub use config::{CustomGameEntry, LauncherConfig, LauncherSettings, SettingValue};
pub use game::{ClientState, Collection, CpuArch, GameRecord, LaunchConfig, SpecialKConfig, StoreOrigin};
pub use install::{Bitness, ConfigType, EntryPoint, InjectionType, InstallState};
