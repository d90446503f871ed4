use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use super::install::InstallState;

/// Catalog a game record was enumerated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreOrigin {
    Steam,
    Epic,
    Gog,
    Xbox,
    Custom,
}

impl StoreOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOrigin::Steam => "Steam",
            StoreOrigin::Epic => "Epic",
            StoreOrigin::Gog => "GOG",
            StoreOrigin::Xbox => "Xbox",
            StoreOrigin::Custom => "Custom",
        }
    }
}

/// CPU architecture a launch configuration is meant for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuArch {
    X86,
    X64,
    #[default]
    Any,
    Common,
}

/// One way of starting a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub executable: Utf8PathBuf,
    pub working_dir: Utf8PathBuf,
    pub arguments: String,
    /// False when `executable` does not point at an existing file.
    /// Set by the refresh worker, not by collectors.
    pub valid: bool,
    pub arch: CpuArch,
}

impl LaunchConfig {
    /// Create a launch config whose working directory is the executable's directory.
    pub fn new(executable: impl Into<Utf8PathBuf>) -> Self {
        let executable = executable.into();
        let working_dir = executable
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();

        Self {
            executable,
            working_dir,
            arguments: String::new(),
            valid: false,
            arch: CpuArch::Any,
        }
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    pub fn with_arch(mut self, arch: CpuArch) -> Self {
        self.arch = arch;
        self
    }

    /// Directory containing the executable.
    pub fn executable_dir(&self) -> Option<&Utf8Path> {
        self.executable.parent().filter(|p| !p.as_str().is_empty())
    }
}

/// Client-side status flags of an installed title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    pub installed: bool,
    pub running: bool,
    pub updating: bool,
    pub last_checked: Option<SystemTime>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            installed: true,
            running: false,
            updating: false,
            last_checked: None,
        }
    }
}

/// Special K specific data attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialKConfig {
    /// Centralized profile directory for this title.
    pub profile_dir: Option<Utf8PathBuf>,
    /// Injection strategy, filled when the refresh worker resolves records.
    pub injection: Option<InstallState>,
}

/// A detected game title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: u64,
    pub origin: StoreOrigin,
    pub name: String,
    pub install_dir: Utf8PathBuf,
    pub launch_configs: Vec<LaunchConfig>,
    pub client: ClientState,
    pub specialk: SpecialKConfig,
}

impl GameRecord {
    pub fn new(
        id: u64,
        origin: StoreOrigin,
        name: impl Into<String>,
        install_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            id,
            origin,
            name: name.into(),
            install_dir: install_dir.into(),
            launch_configs: Vec::new(),
            client: ClientState::default(),
            specialk: SpecialKConfig::default(),
        }
    }

    pub fn with_launch_config(mut self, launch: LaunchConfig) -> Self {
        self.launch_configs.push(launch);
        self
    }

    /// The launch configuration the resolver consults.
    ///
    /// Multi-executable titles are naively assumed to want their first entry.
    pub fn primary_launch(&self) -> Option<&LaunchConfig> {
        self.launch_configs.first()
    }
}

/// Every game record gathered in one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    /// Refresh cycle that produced this collection; 0 for the initial empty one.
    pub generation: u64,
    pub records: Vec<GameRecord>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: GameRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GameRecord> {
        self.records.iter()
    }

    pub fn find(&self, id: u64) -> Option<&GameRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Drop all records but keep the allocation for the next cycle.
    pub fn clear(&mut self) {
        self.records.clear();
        self.generation = 0;
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a GameRecord;
    type IntoIter = std::slice::Iter<'a, GameRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_config_working_dir_defaults_to_exe_dir() {
        let launch = LaunchConfig::new("/games/foo/bin/foo.exe");
        assert_eq!(launch.working_dir, Utf8PathBuf::from("/games/foo/bin"));
        assert_eq!(launch.executable_dir(), Some(Utf8Path::new("/games/foo/bin")));
        assert!(!launch.valid);
    }

    #[test]
    fn test_executable_without_dir() {
        let launch = LaunchConfig::new("foo.exe");
        assert_eq!(launch.executable_dir(), None);
    }

    #[test]
    fn test_primary_launch_is_first() {
        let record = GameRecord::new(1, StoreOrigin::Steam, "Foo", "/games/foo")
            .with_launch_config(LaunchConfig::new("/games/foo/a.exe"))
            .with_launch_config(LaunchConfig::new("/games/foo/b.exe"));

        let primary = record.primary_launch().unwrap();
        assert_eq!(primary.executable, Utf8PathBuf::from("/games/foo/a.exe"));
    }

    #[test]
    fn test_collection_clear_keeps_capacity() {
        let mut collection = Collection::new();
        for id in 0..16 {
            collection.push(GameRecord::new(id, StoreOrigin::Custom, "x", "/x"));
        }
        collection.generation = 4;
        let capacity = collection.records.capacity();

        collection.clear();

        assert!(collection.is_empty());
        assert_eq!(collection.generation, 0);
        assert_eq!(collection.records.capacity(), capacity);
    }
}
