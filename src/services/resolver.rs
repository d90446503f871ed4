//! Injection strategy resolution.
//!
//! For a game record, decide which Special K DLL is used, through which API entry point, and
//! where its configuration lives. The decision is a pure function of what the
//! [`FileProbe`] reports at call time:
//!
//! 1. Bitness comes from the executable's PE header.
//! 2. The executable directory is searched for a local wrapper DLL, in the fixed order of
//!    [`LOCAL_ENTRY_POINTS`]. The first hit means **local** injection.
//! 3. A local install with a [`CENTRAL_MARKER`] file next to it keeps its config in the
//!    centralized profile directory; otherwise the config sits next to the game.
//! 4. Without a local DLL the game gets **global** injection from the launcher's own
//!    `SpecialK64.dll` / `SpecialK32.dll`.
//!
//! Only the first launch configuration of a record is consulted. The one thing cached is the
//! global DLL's version, and only for the lifetime of a [`ResolveBatch`]; callers memoize if
//! they need stable answers across filesystem changes.

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::cell::OnceCell;
use std::sync::{Arc, LazyLock};

use super::probe::FileProbe;
use crate::config::LauncherPaths;
use crate::models::{
    Bitness, ConfigType, EntryPoint, GameRecord, InjectionType, InstallState, LaunchConfig,
};

/// Local wrapper DLLs, in probe order.
pub const LOCAL_ENTRY_POINTS: [EntryPoint; 5] = [
    EntryPoint::D3D9,
    EntryPoint::DXGI,
    EntryPoint::D3D11,
    EntryPoint::OpenGL,
    EntryPoint::DInput8,
];

/// Marker file that redirects a local install's config to the profile directory.
pub const CENTRAL_MARKER: &str = "SpecialK.Central";

/// Config file name for centralized and global installs.
pub const CENTRAL_CONFIG_FILE: &str = "SpecialK.ini";

/// Directory under userdata holding per-game profiles.
pub const PROFILES_DIR: &str = "Profiles";

static ILLEGAL_FILENAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("illegal filename character pattern is valid")
});

/// Make a game name usable as a directory name.
///
/// Characters Windows rejects in file names are removed, then any whitespace left dangling at
/// the end is trimmed.
pub fn sanitize_game_name(name: &str) -> String {
    ILLEGAL_FILENAME_CHARS
        .replace_all(name, "")
        .trim_end()
        .to_string()
}

/// Name of the launcher's global injection DLL for a given bitness.
pub fn global_dll_name(bitness: Bitness) -> &'static str {
    match bitness {
        Bitness::Bits32 => "SpecialK32.dll",
        _ => "SpecialK64.dll",
    }
}

/// Decides how Special K attaches to a game.
#[derive(Clone)]
pub struct InjectionResolver {
    paths: LauncherPaths,
    probe: Arc<dyn FileProbe>,
    launcher_bitness: Bitness,
}

impl std::fmt::Debug for InjectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionResolver")
            .field("paths", &self.paths)
            .field("launcher_bitness", &self.launcher_bitness)
            .finish_non_exhaustive()
    }
}

impl InjectionResolver {
    pub fn new(paths: LauncherPaths, probe: Arc<dyn FileProbe>) -> Self {
        Self {
            paths,
            probe,
            launcher_bitness: Bitness::of_launcher(),
        }
    }

    /// Pretend the launcher was built for another pointer width.
    pub fn with_launcher_bitness(mut self, bitness: Bitness) -> Self {
        if bitness.is_known() {
            self.launcher_bitness = bitness;
        }
        self
    }

    pub fn paths(&self) -> &LauncherPaths {
        &self.paths
    }

    pub fn launcher_bitness(&self) -> Bitness {
        self.launcher_bitness
    }

    /// Centralized profile directory of a game: `<userdata>/Profiles/<sanitized name>`.
    pub fn profile_dir(&self, record: &GameRecord) -> Utf8PathBuf {
        let mut folder = sanitize_game_name(&record.name);
        if folder.is_empty() {
            folder = record.id.to_string();
        }
        self.paths.userdata_dir.join(PROFILES_DIR).join(folder)
    }

    /// Path of the global injection DLL matching the launcher's own build.
    pub fn global_dll_path(&self) -> Utf8PathBuf {
        self.paths
            .install_dir
            .join(global_dll_name(self.launcher_bitness))
    }

    /// Resolve using the record's first launch configuration.
    pub fn resolve(&self, record: &GameRecord) -> InstallState {
        self.batch().resolve(record)
    }

    /// Resolve for a specific launch configuration of `record`.
    pub fn resolve_launch(&self, record: &GameRecord, launch: &LaunchConfig) -> InstallState {
        self.batch().resolve_launch(record, launch)
    }

    /// Start resolving a group of records that share one read of the global DLL's version.
    pub fn batch(&self) -> ResolveBatch<'_> {
        ResolveBatch {
            resolver: self,
            global_version: OnceCell::new(),
        }
    }

    fn resolve_launch_with(
        &self,
        record: &GameRecord,
        launch: &LaunchConfig,
        global_version: &OnceCell<Option<String>>,
    ) -> InstallState {
        if launch.executable.as_str().is_empty() {
            tracing::debug!("Empty executable path, nothing to resolve");
            return InstallState::default();
        }

        let bitness = self.probe.read_bitness(&launch.executable);

        if let Some(exe_dir) = launch.executable_dir() {
            if let Some((entry_point, dll_path)) = self.find_local_dll(exe_dir) {
                return self.local_state(record, exe_dir, bitness, entry_point, dll_path);
            }
        }

        self.global_state(record, bitness, global_version)
    }

    fn find_local_dll(&self, exe_dir: &Utf8Path) -> Option<(EntryPoint, Utf8PathBuf)> {
        LOCAL_ENTRY_POINTS.iter().find_map(|entry_point| {
            let stem = entry_point.dll_stem()?;
            let dll_path = exe_dir.join(format!("{stem}.dll"));
            self.probe
                .file_exists(&dll_path)
                .then_some((*entry_point, dll_path))
        })
    }

    fn local_state(
        &self,
        record: &GameRecord,
        exe_dir: &Utf8Path,
        bitness: Bitness,
        entry_point: EntryPoint,
        dll_path: Utf8PathBuf,
    ) -> InstallState {
        let dll_version = self.probe.read_version(&dll_path);
        let centralized = self.probe.file_exists(&exe_dir.join(CENTRAL_MARKER));

        let (config_type, config_dir, config_file) = if centralized {
            (
                ConfigType::Centralized,
                self.profile_dir(record),
                CENTRAL_CONFIG_FILE.to_string(),
            )
        } else {
            let stem = entry_point.dll_stem().unwrap_or("SpecialK");
            (
                ConfigType::Localized,
                exe_dir.to_path_buf(),
                format!("{stem}.ini"),
            )
        };

        tracing::debug!(
            "Local injection via {} ({:?}), config {:?}",
            dll_path,
            dll_version,
            config_type
        );

        InstallState {
            bitness,
            entry_point,
            injection_type: InjectionType::Local,
            dll_path: Some(dll_path),
            dll_version,
            config_type,
            config_dir: Some(config_dir),
            config_file: Some(config_file),
        }
    }

    fn global_state(
        &self,
        record: &GameRecord,
        bitness: Bitness,
        global_version: &OnceCell<Option<String>>,
    ) -> InstallState {
        let bitness = if bitness.is_known() {
            bitness
        } else {
            self.launcher_bitness
        };

        let dll_path = self.global_dll_path();
        let dll_version = global_version
            .get_or_init(|| self.probe.read_version(&dll_path))
            .clone();

        tracing::debug!("Global injection via {} ({:?})", dll_path, dll_version);

        InstallState {
            bitness,
            entry_point: EntryPoint::CBTHook,
            injection_type: InjectionType::Global,
            dll_path: Some(dll_path),
            dll_version,
            config_type: ConfigType::Centralized,
            config_dir: Some(self.profile_dir(record)),
            config_file: Some(CENTRAL_CONFIG_FILE.to_string()),
        }
    }
}

/// Resolves many records against a single read of the global DLL's version.
///
/// A refresh cycle opens one batch, so a library of globally injected games costs one version
/// read per cycle rather than one per game.
pub struct ResolveBatch<'a> {
    resolver: &'a InjectionResolver,
    global_version: OnceCell<Option<String>>,
}

impl ResolveBatch<'_> {
    /// Resolve using the record's first launch configuration.
    #[tracing::instrument(level = "debug", skip_all, fields(id = record.id, name = %record.name))]
    pub fn resolve(&self, record: &GameRecord) -> InstallState {
        match record.primary_launch() {
            Some(launch) => self.resolve_launch(record, launch),
            None => {
                tracing::debug!("No launch configuration, nothing to resolve");
                InstallState::default()
            }
        }
    }

    /// Resolve for a specific launch configuration of `record`.
    pub fn resolve_launch(&self, record: &GameRecord, launch: &LaunchConfig) -> InstallState {
        self.resolver
            .resolve_launch_with(record, launch, &self.global_version)
    }
}
