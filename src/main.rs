//! ContextForge GUI - compile ContextForge projects without freezing the display
//!
//! Main entry point for the application.
//!
//! # Overview
//!
//! This binary wires the library pipeline to a front end. It initializes:
//! - Configuration loading ([`ConfigManager`], `ContextForge Data/ContextForge GUI.yaml`)
//! - Logging infrastructure (file rotation + optional console output)
//! - Tokio runtime (blocking pool for workers, subprocess management)
//! - State management ([`StateManager`]) and [`Metrics`]
//! - The [`TaskLauncher`] backed by the `contextforge` command line tool
//!
//! The threading model:
//! - **Main thread**: The display-owning thread (console loop or Slint event loop)
//! - **Blocking pool**: One worker per launched run
//! - **Forwarder thread**: Push-model dispatch onto the display thread
//!
//! # Execution Flow
//!
//! 1. Load configuration (defaults when the file is missing)
//! 2. Initialize logging → logs/contextforge-gui.<date>
//! 3. Create tokio runtime with 4 worker threads
//! 4. Create StateManager, Metrics, CommandCompiler and TaskLauncher
//! 5. Run the configured front end (blocks until done or window closed)
//! 6. Cancel any run still in flight, shut the runtime down with a 5s timeout

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use contextforge_gui::config::DEFAULT_CONFIG_DIR;
use contextforge_gui::models::{FrontendKind, GuiConfig};
use contextforge_gui::services::CommandCompiler;
use contextforge_gui::task::WorkerOptions;
use contextforge_gui::ui::ConsoleFrontend;
use contextforge_gui::{
    APP_NAME, ConfigManager, Metrics, StateManager, TaskLauncher, TerminalOutcome, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    // Logging is configured from these settings; the load is reported below
    let config_manager = ConfigManager::new(DEFAULT_CONFIG_DIR)?;
    let config_found = config_manager.config_exists();
    let config = config_manager.load_config()?;
    let settings = &config.settings;

    let _log_guard = contextforge_gui::logging::setup_logging(
        Utf8Path::new(&settings.log_directory),
        APP_NAME,
        settings.debug_mode,
        settings.console_logging,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    if config_found {
        tracing::info!("Loaded config from {}", config_manager.config_path());
    } else {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            config_manager.config_path()
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("contextforge-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    let state_manager = Arc::new(StateManager::new());
    let metrics = Arc::new(Metrics::new());

    let mut state_changes = state_manager.subscribe();
    runtime.spawn(async move {
        loop {
            match state_changes.recv().await {
                Ok(change) => tracing::debug!("State change: {:?}", change),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("State listener lagged, {} events missed", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let compiler = CommandCompiler::new(
        settings.compiler_command.clone(),
        settings.compiler_args.clone(),
        settings.compile_timeout(),
        runtime.handle().clone(),
    );
    let launcher = Arc::new(
        TaskLauncher::new(
            runtime.handle().clone(),
            Arc::new(compiler),
            Arc::clone(&state_manager),
            Arc::clone(&metrics),
        )
        .with_options(WorkerOptions {
            capture_diagnostics: settings.capture_diagnostics,
        }),
    );

    let result = match settings.frontend {
        FrontendKind::Console => run_console(&launcher, &config),
        FrontendKind::Slint => run_slint(&launcher, &config),
    };

    tracing::info!("Front end closed, shutting down");

    if let Some(run_id) = launcher.cancel_active() {
        tracing::warn!("Closed during run {} - cancelling...", run_id);
    }

    runtime.shutdown_timeout(Duration::from_secs(5));
    metrics.log_summary();

    tracing::info!("Application shutdown complete");

    result.inspect_err(|e| tracing::error!("Front end error: {:#}", e))
}

fn run_console(launcher: &Arc<TaskLauncher>, config: &GuiConfig) -> Result<()> {
    let mut console = ConsoleFrontend::new(
        Arc::clone(launcher),
        config.settings.dispatch_mode,
        config.settings.poll_interval(),
        std::io::stdout(),
    );

    let run_id = console.launch(config.request_defaults.to_request())?;

    match console.wait(run_id, None)? {
        TerminalOutcome::Success => Ok(()),
        TerminalOutcome::Failure(detail) => bail!("Compilation failed: {}", detail),
    }
}

#[cfg(feature = "slint-frontend")]
fn run_slint(launcher: &Arc<TaskLauncher>, config: &GuiConfig) -> Result<()> {
    contextforge_gui::ui::SlintFrontend::new(Arc::clone(launcher), &config.request_defaults)?.run()
}

#[cfg(not(feature = "slint-frontend"))]
fn run_slint(_launcher: &Arc<TaskLauncher>, _config: &GuiConfig) -> Result<()> {
    bail!("Built without the Slint front end; enable the `slint-frontend` feature or set `Frontend: console`")
}
