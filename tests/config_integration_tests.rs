//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Default configuration when the file is missing
//! - Saving and loading round trips through the YAML file
//! - Hand-written files with only some keys present
//! - Request defaults feeding the launcher's validation

use camino::Utf8PathBuf;
use contextforge_gui::config::CONFIG_FILE_NAME;
use contextforge_gui::models::{DispatchMode, FrontendKind, OutputFormat};
use contextforge_gui::{ConfigManager, GuiConfig};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), config_path.as_path());
    assert_eq!(manager.config_path(), config_path.join(CONFIG_FILE_NAME).as_path());
}

#[test]
fn test_creates_missing_config_dir() {
    let (_temp_dir, root) = create_test_config_dir();
    let nested = root.join("ContextForge Data");

    let manager = ConfigManager::new(&nested).unwrap();

    assert!(nested.is_dir());
    assert!(!manager.config_path().exists());
}

#[test]
fn test_load_default_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert!(!manager.config_exists());
    let config = manager.load_config().unwrap();

    assert_eq!(config.settings.frontend, FrontendKind::Console);
    assert_eq!(config.settings.dispatch_mode, DispatchMode::Polling);
    assert_eq!(config.settings.poll_interval(), Duration::from_millis(100));
    assert!(config.settings.capture_diagnostics);
    assert_eq!(config.settings.compiler_command, "contextforge");
    assert_eq!(config.request_defaults.output_format, OutputFormat::Markdown);
    assert_eq!(config.request_defaults.max_file_size, 1_000_000);
}

#[test]
fn test_save_and_load_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut config = manager.load_config().unwrap();
    config.settings.dispatch_mode = DispatchMode::Push;
    config.settings.compiler_args = vec!["--quiet".to_string()];
    config.request_defaults.project_path = "/proj".to_string();
    config.request_defaults.output_file = "out.md".to_string();
    config.request_defaults.output_format = OutputFormat::Json;

    manager.save_config(&config).unwrap();
    assert!(manager.config_exists());

    let loaded = manager.load_config().unwrap();
    assert_eq!(loaded.settings.dispatch_mode, DispatchMode::Push);
    assert_eq!(loaded.settings.compiler_args, vec!["--quiet"]);
    assert_eq!(loaded.request_defaults.project_path, "/proj");
    assert_eq!(loaded.request_defaults.output_format, OutputFormat::Json);
}

#[test]
fn test_hand_written_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let yaml = r#"
GUI_Settings:
  Frontend: slint
  Poll Interval: 25
  Compile Timeout: 120
Request_Defaults:
  Project Path: /home/user/project
  Output Format: html
"#;
    fs::write(manager.config_path(), yaml).unwrap();

    let config = manager.load_config().unwrap();

    assert_eq!(config.settings.frontend, FrontendKind::Slint);
    assert_eq!(config.settings.poll_interval(), Duration::from_millis(25));
    assert_eq!(
        config.settings.compile_timeout(),
        Some(Duration::from_secs(120))
    );
    assert_eq!(config.settings.log_directory, "logs");
    assert_eq!(config.request_defaults.output_format, OutputFormat::Html);
    assert_eq!(config.request_defaults.output_file, "");

    let request = config.request_defaults.to_request();
    assert_eq!(request.project_path().as_str(), "/home/user/project");
    assert_eq!(request.output_format(), OutputFormat::Html);
    assert_eq!(request.resolved_output(), None);
}

#[test]
fn test_invalid_yaml_reports_path() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.config_path(), "GUI_Settings: [not, a, map").unwrap();

    let err = manager.load_config().unwrap_err();
    assert!(format!("{:#}", err).contains(CONFIG_FILE_NAME));
}

#[test]
fn test_unknown_output_format_rejected() {
    let yaml = "Request_Defaults:\n  Output Format: pdf\n";
    assert!(serde_yaml_ng::from_str::<GuiConfig>(yaml).is_err());
}

#[test]
fn test_default_request_is_rejected_by_launcher_validation() {
    let config = GuiConfig::default();
    let request = config.request_defaults.to_request();

    assert!(request.is_missing_project_path());
}
