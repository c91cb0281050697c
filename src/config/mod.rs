use crate::models::GuiConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Default configuration directory, relative to the working directory.
pub const DEFAULT_CONFIG_DIR: &str = "ContextForge Data";

/// File name of the GUI configuration inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "ContextForge GUI.yaml";

/// Configuration manager for loading and saving the YAML configuration file.
///
/// Manages `ContextForge GUI.yaml`: front end and dispatch settings, the
/// compiler command, logging options and the request field defaults.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "ContextForge Data")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration file.
    ///
    /// # Returns
    /// The loaded GuiConfig, or defaults if the file doesn't exist
    pub fn load_config(&self) -> Result<GuiConfig> {
        if !self.config_exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
            return Ok(GuiConfig::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: GuiConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &GuiConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// False when `load_config` would fall back to defaults.
    pub fn config_exists(&self) -> bool {
        self.config_path.is_file()
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
