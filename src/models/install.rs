use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pointer width of a binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bitness {
    #[default]
    Unknown,
    Bits32,
    Bits64,
}

impl Bitness {
    /// Bitness of the running launcher build.
    pub const fn of_launcher() -> Self {
        if cfg!(target_pointer_width = "64") {
            Bitness::Bits64
        } else {
            Bitness::Bits32
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Bitness::Unknown)
    }
}

impl fmt::Display for Bitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitness::Unknown => write!(f, "Unknown"),
            Bitness::Bits32 => write!(f, "32-bit"),
            Bitness::Bits64 => write!(f, "64-bit"),
        }
    }
}

/// API surface the injected DLL attaches through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryPoint {
    D3D9,
    D3D11,
    DXGI,
    OpenGL,
    DInput8,
    /// Global injection through the system-wide CBT hook.
    CBTHook,
    #[default]
    Unknown,
}

impl EntryPoint {
    /// DLL basename (without extension) a local install uses for this entry point.
    pub fn dll_stem(&self) -> Option<&'static str> {
        match self {
            EntryPoint::D3D9 => Some("d3d9"),
            EntryPoint::D3D11 => Some("d3d11"),
            EntryPoint::DXGI => Some("dxgi"),
            EntryPoint::OpenGL => Some("OpenGL32"),
            EntryPoint::DInput8 => Some("dinput8"),
            EntryPoint::CBTHook | EntryPoint::Unknown => None,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryPoint::D3D9 => "Direct3D 9",
            EntryPoint::D3D11 => "Direct3D 11",
            EntryPoint::DXGI => "DXGI",
            EntryPoint::OpenGL => "OpenGL",
            EntryPoint::DInput8 => "DirectInput 8",
            EntryPoint::CBTHook => "CBT Hook",
            EntryPoint::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjectionType {
    Global,
    Local,
    #[default]
    Unknown,
}

/// Where the injected component keeps its settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigType {
    Centralized,
    Localized,
    #[default]
    Unknown,
}

/// How and where Special K is deployed for one game.
///
/// Produced fresh by every [`crate::services::InjectionResolver`] call. The default value has
/// every field set to its unknown state and is what callers get when nothing could be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallState {
    pub bitness: Bitness,
    pub entry_point: EntryPoint,
    pub injection_type: InjectionType,
    pub dll_path: Option<Utf8PathBuf>,
    pub dll_version: Option<String>,
    pub config_type: ConfigType,
    pub config_dir: Option<Utf8PathBuf>,
    pub config_file: Option<String>,
}

impl InstallState {
    /// Full path of the configuration file, when both parts are known.
    pub fn config_path(&self) -> Option<Utf8PathBuf> {
        match (&self.config_dir, &self.config_file) {
            (Some(dir), Some(file)) => Some(dir.join(file)),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == InstallState::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unknown() {
        let state = InstallState::default();
        assert!(state.is_unknown());
        assert_eq!(state.bitness, Bitness::Unknown);
        assert_eq!(state.entry_point, EntryPoint::Unknown);
        assert_eq!(state.injection_type, InjectionType::Unknown);
        assert_eq!(state.config_type, ConfigType::Unknown);
        assert_eq!(state.config_path(), None);
    }

    #[test]
    fn test_config_path_joins_dir_and_file() {
        let state = InstallState {
            config_dir: Some(Utf8PathBuf::from("/games/foo")),
            config_file: Some("d3d11.ini".to_string()),
            ..Default::default()
        };
        assert_eq!(state.config_path(), Some(Utf8PathBuf::from("/games/foo/d3d11.ini")));
    }

    #[test]
    fn test_dll_stems() {
        assert_eq!(EntryPoint::OpenGL.dll_stem(), Some("OpenGL32"));
        assert_eq!(EntryPoint::CBTHook.dll_stem(), None);
    }

    #[test]
    fn test_launcher_bitness_is_known() {
        assert!(Bitness::of_launcher().is_known());
    }
}
