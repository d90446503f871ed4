use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::game::{CpuArch, GameRecord, LaunchConfig, StoreOrigin};

/// Launcher configuration from SKIF.yaml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(rename = "SKIF_Settings", default)]
    pub settings: LauncherSettings,

    #[serde(rename = "SKIF_Custom_Games", default)]
    pub custom_games: Vec<CustomGameEntry>,

    /// Free-form values carried over from the registry-backed settings store
    #[serde(rename = "SKIF_Values", default)]
    pub values: IndexMap<String, SettingValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LauncherSettings {
    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,

    #[serde(rename = "Log Directory", default = "default_log_dir")]
    pub log_dir: Utf8PathBuf,

    /// Overrides `<Documents>/My Mods/SpecialK`
    #[serde(rename = "Userdata Directory", default)]
    pub userdata_dir: Option<Utf8PathBuf>,

    /// Overrides the directory of the running executable
    #[serde(rename = "Install Directory", default)]
    pub install_dir: Option<Utf8PathBuf>,

    #[serde(rename = "Watch Directories", default)]
    pub watch_dirs: Vec<Utf8PathBuf>,

    #[serde(rename = "Resolve On Refresh", default = "default_true")]
    pub resolve_on_refresh: bool,

    #[serde(rename = "Frame Interval Ms", default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            debug_mode: false,
            log_dir: default_log_dir(),
            userdata_dir: None,
            install_dir: None,
            watch_dirs: Vec::new(),
            resolve_on_refresh: true,
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

fn default_log_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("logs")
}

fn default_true() -> bool {
    true
}

fn default_frame_interval_ms() -> u64 {
    100
}

/// A manually added game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomGameEntry {
    #[serde(rename = "Id")]
    pub id: u64,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Install Directory", default)]
    pub install_dir: Option<Utf8PathBuf>,

    #[serde(rename = "Executable")]
    pub executable: Utf8PathBuf,

    #[serde(rename = "Launch Options", default)]
    pub arguments: String,

    #[serde(rename = "Working Directory", default)]
    pub working_dir: Option<Utf8PathBuf>,

    #[serde(rename = "Arch", default)]
    pub arch: CpuArch,
}

impl CustomGameEntry {
    /// Build the game record this entry describes.
    pub fn to_record(&self) -> GameRecord {
        let mut launch = LaunchConfig::new(self.executable.clone())
            .with_arguments(self.arguments.clone())
            .with_arch(self.arch);
        if let Some(dir) = &self.working_dir {
            launch.working_dir = dir.clone();
        }

        let install_dir = self
            .install_dir
            .clone()
            .unwrap_or_else(|| launch.working_dir.clone());

        GameRecord::new(self.id, StoreOrigin::Custom, self.name.clone(), install_dir)
            .with_launch_config(launch)
    }
}

/// A typed settings value.
///
/// Covers every value kind the launcher stores: strings, flags, integers, floats and string lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    StringList(Vec<String>),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            SettingValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            SettingValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            SettingValue::Float(f) => Some(*f),
            SettingValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            SettingValue::StringList(list) => Some(list),
            _ => None,
        }
    }

    /// Short name of the value kind, used in log output
    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "bool",
            SettingValue::Int(_) => "int",
            SettingValue::Float(_) => "float",
            SettingValue::String(_) => "string",
            SettingValue::StringList(_) => "string-list",
        }
    }
}

impl LauncherConfig {
    /// Look up a free-form value
    pub fn value(&self, name: &str) -> Option<&SettingValue> {
        self.values.get(name)
    }

    /// Flag lookup with a default for missing or mistyped values
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.value(name).and_then(SettingValue::as_bool).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = LauncherSettings::default();
        assert!(!settings.debug_mode);
        assert!(settings.resolve_on_refresh);
        assert_eq!(settings.frame_interval_ms, 100);
        assert_eq!(settings.log_dir, Utf8PathBuf::from("logs"));
    }

    #[test]
    fn test_setting_value_untagged_parsing() {
        let yaml = "a: true\nb: 42\nc: 1.5\nd: hello\ne: [x, y]\n";
        let values: IndexMap<String, SettingValue> = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(values["a"], SettingValue::Bool(true));
        assert_eq!(values["b"], SettingValue::Int(42));
        assert_eq!(values["c"], SettingValue::Float(1.5));
        assert_eq!(values["d"], SettingValue::String("hello".to_string()));
        assert_eq!(
            values["e"],
            SettingValue::StringList(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn test_setting_value_accessors() {
        assert_eq!(SettingValue::Int(1).as_bool(), Some(true));
        assert_eq!(SettingValue::Bool(true).as_int(), Some(1));
        assert_eq!(SettingValue::Int(3).as_float(), Some(3.0));
        assert_eq!(SettingValue::String("x".into()).as_bool(), None);
        assert_eq!(SettingValue::StringList(vec![]).kind(), "string-list");
    }

    #[test]
    fn test_flag_falls_back_to_default() {
        let mut config = LauncherConfig::default();
        config
            .values
            .insert("Low Bandwidth".to_string(), SettingValue::String("yes".into()));

        assert!(config.flag("Low Bandwidth", true));
        assert!(!config.flag("Missing", false));
    }

    #[test]
    fn test_custom_entry_to_record() {
        let entry = CustomGameEntry {
            id: 7,
            name: "Foo".to_string(),
            install_dir: None,
            executable: Utf8PathBuf::from("/games/foo/foo.exe"),
            arguments: "-dx11".to_string(),
            working_dir: None,
            arch: CpuArch::X64,
        };

        let record = entry.to_record();
        assert_eq!(record.origin, StoreOrigin::Custom);
        assert_eq!(record.install_dir, Utf8PathBuf::from("/games/foo"));

        let launch = record.primary_launch().unwrap();
        assert_eq!(launch.arguments, "-dx11");
        assert_eq!(launch.arch, CpuArch::X64);
    }
}
