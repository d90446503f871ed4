//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Loading a hand-written SKIF.yaml with every section
//! - Default configuration when the file is missing
//! - Save/load persistence and custom game management
//! - Invalid YAML handling
//! - Launcher directory resolution from settings

use camino::Utf8PathBuf;
use skif::models::{CpuArch, CustomGameEntry, SettingValue};
use skif::{ConfigManager, LauncherConfig, LauncherPaths};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

const SAMPLE_CONFIG: &str = r#"
SKIF_Settings:
  Debug Mode: true
  Log Directory: "D:/SKIF/logs"
  Userdata Directory: "D:/SK"
  Watch Directories:
    - "C:/Program Files (x86)/Steam/steamapps"
  Resolve On Refresh: false
  Frame Interval Ms: 16
SKIF_Custom_Games:
  - Id: 7
    Name: "Foo: The *Game*?"
    Executable: "D:/Games/Foo/foo.exe"
    Launch Options: "-dx11"
    Arch: x64
SKIF_Values:
  Auto Update: false
  Notification Duration: 5
  UI Scale: 1.25
  Last Selected Game: "Foo"
  Ignored Updates:
    - "24.7.1"
    - "24.8.0"
"#;

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.launcher_config_path(), &config_path.join("SKIF.yaml"));
}

#[test]
fn test_creates_missing_config_dir() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("SKIF Data");

    ConfigManager::new(&nested).unwrap();

    assert!(nested.is_dir());
}

#[test]
fn test_load_default_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load_launcher_config().unwrap();

    assert!(!config.settings.debug_mode);
    assert!(config.settings.resolve_on_refresh);
    assert_eq!(config.settings.frame_interval_ms, 100);
    assert_eq!(config.settings.log_dir, Utf8PathBuf::from("logs"));
    assert!(config.custom_games.is_empty());
    assert!(config.values.is_empty());
}

#[test]
fn test_load_full_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("SKIF.yaml"), SAMPLE_CONFIG).unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load_launcher_config().unwrap();

    let settings = &config.settings;
    assert!(settings.debug_mode);
    assert!(!settings.resolve_on_refresh);
    assert_eq!(settings.frame_interval_ms, 16);
    assert_eq!(settings.userdata_dir, Some(Utf8PathBuf::from("D:/SK")));
    assert_eq!(settings.install_dir, None);
    assert_eq!(settings.watch_dirs.len(), 1);

    let game = &config.custom_games[0];
    assert_eq!(game.id, 7);
    assert_eq!(game.arguments, "-dx11");
    assert_eq!(game.arch, CpuArch::X64);

    // values keep file order and their kind
    let names: Vec<&str> = config.values.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "Auto Update",
            "Notification Duration",
            "UI Scale",
            "Last Selected Game",
            "Ignored Updates"
        ]
    );
    assert_eq!(config.value("Auto Update"), Some(&SettingValue::Bool(false)));
    assert_eq!(config.value("Notification Duration").and_then(SettingValue::as_int), Some(5));
    assert_eq!(config.value("UI Scale").and_then(SettingValue::as_float), Some(1.25));
    assert_eq!(config.value("Last Selected Game").and_then(SettingValue::as_str), Some("Foo"));
    assert_eq!(
        config.value("Ignored Updates").and_then(SettingValue::as_list).map(<[String]>::len),
        Some(2)
    );
    assert!(!config.flag("Auto Update", true));
    assert!(config.flag("Missing Flag", true));
}

#[test]
fn test_save_and_reload_roundtrip() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("SKIF.yaml"), SAMPLE_CONFIG).unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    let config = manager.load_launcher_config().unwrap();
    manager.save_launcher_config(&config).unwrap();
    let reloaded = manager.load_launcher_config().unwrap();

    assert_eq!(reloaded, config);
}

#[test]
fn test_invalid_yaml_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("SKIF.yaml"), "SKIF_Settings: [unclosed").unwrap();
    let manager = ConfigManager::new(&config_path).unwrap();

    let result = manager.load_launcher_config();

    assert!(result.is_err());
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("Failed to parse launcher config"));
}

#[test]
fn test_add_custom_game_persists() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    manager
        .add_custom_game(CustomGameEntry {
            id: 42,
            name: "Manual".to_string(),
            install_dir: None,
            executable: Utf8PathBuf::from("/games/manual/run.exe"),
            arguments: String::new(),
            working_dir: None,
            arch: CpuArch::Any,
        })
        .unwrap();

    let fresh = ConfigManager::new(&config_path).unwrap();
    let config = fresh.load_launcher_config().unwrap();
    assert_eq!(config.custom_games.len(), 1);

    let record = config.custom_games[0].to_record();
    assert_eq!(record.install_dir, Utf8PathBuf::from("/games/manual"));
    assert_eq!(
        record.primary_launch().map(|l| l.executable.as_str()),
        Some("/games/manual/run.exe")
    );
}

#[test]
fn test_launcher_paths_from_loaded_settings() {
    let (_temp_dir, config_path) = create_test_config_dir();
    fs::write(config_path.join("SKIF.yaml"), SAMPLE_CONFIG).unwrap();
    let config: LauncherConfig = ConfigManager::new(&config_path)
        .unwrap()
        .load_launcher_config()
        .unwrap();

    let paths = LauncherPaths::from_settings(&config.settings).unwrap();

    assert_eq!(paths.userdata_dir, Utf8PathBuf::from("D:/SK"));
    assert_eq!(paths.profiles_dir(), Utf8PathBuf::from("D:/SK").join("Profiles"));
    assert!(paths.install_dir.is_dir());
}
