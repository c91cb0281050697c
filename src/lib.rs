// ContextForge GUI - Background compilation front ends for ContextForge projects
//
// This is the library crate containing the launch/worker/dispatch pipeline.
// The binary crate (main.rs) wires it to the console or Slint front end.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod task;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{GuiConfig, OutputFormat, RunId, TaskRequest, TerminalOutcome};
pub use state::{StateChange, StateManager};
pub use task::{LaunchError, TaskLauncher};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
