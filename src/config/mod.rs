use crate::models::{CustomGameEntry, LauncherConfig, LauncherSettings};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Configuration manager for loading and saving `SKIF.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    launcher_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            launcher_config_path: config_dir.join("SKIF.yaml"),
            config_dir,
        })
    }

    /// Load the launcher configuration file.
    ///
    /// # Returns
    /// The loaded LauncherConfig, or default if file doesn't exist
    pub fn load_launcher_config(&self) -> Result<LauncherConfig> {
        if !self.launcher_config_path.exists() {
            tracing::warn!(
                "Launcher config file not found at {}, using defaults",
                self.launcher_config_path
            );
            return Ok(LauncherConfig::default());
        }

        let file_contents = fs::read_to_string(&self.launcher_config_path).with_context(|| {
            format!("Failed to read launcher config: {}", self.launcher_config_path)
        })?;

        let config: LauncherConfig = serde_yaml_ng::from_str(&file_contents).with_context(|| {
            format!("Failed to parse launcher config: {}", self.launcher_config_path)
        })?;

        tracing::info!(
            "Loaded launcher config from {} ({} custom games, {} values)",
            self.launcher_config_path,
            config.custom_games.len(),
            config.values.len()
        );
        Ok(config)
    }

    /// Save the launcher configuration file.
    pub fn save_launcher_config(&self, config: &LauncherConfig) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(config)
            .context("Failed to serialize launcher config to YAML")?;

        fs::write(&self.launcher_config_path, yaml_string).with_context(|| {
            format!("Failed to write launcher config: {}", self.launcher_config_path)
        })?;

        tracing::info!("Saved launcher config to {}", self.launcher_config_path);
        Ok(())
    }

    /// Append a manual game entry and persist the file.
    ///
    /// An existing entry with the same id is replaced.
    pub fn add_custom_game(&self, entry: CustomGameEntry) -> Result<LauncherConfig> {
        let mut config = self.load_launcher_config()?;
        config.custom_games.retain(|g| g.id != entry.id);
        config.custom_games.push(entry);
        self.save_launcher_config(&config)?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn launcher_config_path(&self) -> &Utf8Path {
        &self.launcher_config_path
    }
}

/// Directories the injection resolver derives paths from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherPaths {
    /// Directory holding `SpecialK64.dll` / `SpecialK32.dll`
    pub install_dir: Utf8PathBuf,
    /// Root of the centralized data tree (`Profiles/` lives here)
    pub userdata_dir: Utf8PathBuf,
}

impl LauncherPaths {
    /// Resolve directories from settings, falling back to platform defaults.
    ///
    /// - install directory: directory of the running executable
    /// - userdata directory: `<Documents>/My Mods/SpecialK`
    pub fn from_settings(settings: &LauncherSettings) -> Result<Self> {
        let install_dir = match &settings.install_dir {
            Some(dir) => dir.clone(),
            None => default_install_dir()?,
        };

        let userdata_dir = match &settings.userdata_dir {
            Some(dir) => dir.clone(),
            None => default_userdata_dir()?,
        };

        tracing::debug!(
            "Launcher paths: install={}, userdata={}",
            install_dir,
            userdata_dir
        );

        Ok(Self {
            install_dir,
            userdata_dir,
        })
    }

    pub fn profiles_dir(&self) -> Utf8PathBuf {
        self.userdata_dir.join(crate::services::resolver::PROFILES_DIR)
    }
}

fn default_install_dir() -> Result<Utf8PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let exe = Utf8PathBuf::try_from(exe).context("Executable path is not valid UTF-8")?;
    exe.parent()
        .map(Utf8Path::to_path_buf)
        .with_context(|| format!("Executable has no parent directory: {}", exe))
}

fn default_userdata_dir() -> Result<Utf8PathBuf> {
    let documents = dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
        .context("No documents or home directory found for the current user")?;
    let documents =
        Utf8PathBuf::try_from(documents).context("Documents path is not valid UTF-8")?;
    Ok(documents.join("My Mods").join("SpecialK"))
}
