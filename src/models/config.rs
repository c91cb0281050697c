use super::request::{DEFAULT_MAX_FILE_SIZE, OutputFormat, TaskRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration from `ContextForge GUI.yaml`
///
/// Contains front end selection, dispatch tuning, compiler invocation and the
/// values the request fields start with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuiConfig {
    #[serde(rename = "GUI_Settings", default)]
    pub settings: GuiSettings,

    #[serde(rename = "Request_Defaults", default)]
    pub request_defaults: RequestDefaults,
}

/// Which front end the binary starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontendKind {
    #[default]
    Console,
    Slint,
}

/// How notifications reach the display-owning thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Drain the channel on a fixed interval from the display thread.
    #[default]
    Polling,
    /// Forward each notification as a closure queued onto the display thread.
    Push,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuiSettings {
    #[serde(rename = "Frontend", default)]
    pub frontend: FrontendKind,

    #[serde(rename = "Dispatch Mode", default)]
    pub dispatch_mode: DispatchMode,

    /// Milliseconds between polls of the notification channel
    #[serde(rename = "Poll Interval", default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(rename = "Capture Diagnostics", default = "default_true")]
    pub capture_diagnostics: bool,

    #[serde(rename = "Compiler Command", default = "default_compiler_command")]
    pub compiler_command: String,

    #[serde(rename = "Compiler Args", default)]
    pub compiler_args: Vec<String>,

    /// Seconds; 0 disables the timeout
    #[serde(rename = "Compile Timeout", default)]
    pub compile_timeout: u64,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,

    #[serde(rename = "Console Logging", default)]
    pub console_logging: bool,

    #[serde(rename = "Log Directory", default = "default_log_directory")]
    pub log_directory: String,
}

impl Default for GuiSettings {
    fn default() -> Self {
        Self {
            frontend: FrontendKind::default(),
            dispatch_mode: DispatchMode::default(),
            poll_interval_ms: default_poll_interval(),
            capture_diagnostics: true,
            compiler_command: default_compiler_command(),
            compiler_args: Vec::new(),
            compile_timeout: 0,
            debug_mode: false,
            console_logging: false,
            log_directory: default_log_directory(),
        }
    }
}

impl GuiSettings {
    /// Poll interval, never shorter than one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn compile_timeout(&self) -> Option<Duration> {
        (self.compile_timeout > 0).then(|| Duration::from_secs(self.compile_timeout))
    }
}

/// Initial values of the four request fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDefaults {
    #[serde(rename = "Project Path", default)]
    pub project_path: String,

    #[serde(rename = "Output File", default)]
    pub output_file: String,

    #[serde(rename = "Output Format", default)]
    pub output_format: OutputFormat,

    #[serde(rename = "Max File Size", default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            project_path: String::new(),
            output_file: String::new(),
            output_format: OutputFormat::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl RequestDefaults {
    pub fn to_request(&self) -> TaskRequest {
        TaskRequest::new(
            self.project_path.as_str(),
            self.output_file.as_str(),
            self.output_format,
            self.max_file_size,
        )
    }
}

fn default_poll_interval() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_compiler_command() -> String {
    "contextforge".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}
