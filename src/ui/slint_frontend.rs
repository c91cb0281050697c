// Slint front end - the compile window
//
// The Slint event loop thread is the display-owning thread. Notifications
// reach it through the push model: the bridge's forwarder thread queues each
// one with `Weak::upgrade_in_event_loop`, so the output area is only ever
// touched from inside the event loop.

use crate::models::{
    OutputFormat, RequestDefaults, RunId, TaskRequest, TerminalOutcome, full_path_label,
};
use crate::task::{LaunchError, TaskLauncher};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use crate::ui::dispatcher::DispatchError;
use crate::ui::display::{DisplayError, DisplaySurface, show_launch_error};
use crate::ui::event_loop::{DisplayJob, EventLoopTarget};
use anyhow::{Context, Result};
use slint::{ComponentHandle, Weak};
use std::sync::Arc;

slint::slint! {
    import { Button, ComboBox, LineEdit, SpinBox, TextEdit, HorizontalBox, VerticalBox } from "std-widgets.slint";

    export component CompileWindow inherits Window {
        title: "ContextForge";
        preferred-width: 800px;
        preferred-height: 600px;

        in-out property <string> project-path;
        in-out property <string> output-file;
        in-out property <string> output-format: "markdown";
        in-out property <int> max-file-size: 1000000;
        in property <string> full-path;
        in-out property <string> output;
        in property <bool> is-compiling;

        callback compile();
        callback clear-output();
        callback paths-edited();

        VerticalBox {
            HorizontalBox {
                Text { text: "Project Path:"; vertical-alignment: center; }
                LineEdit {
                    text <=> root.project-path;
                    edited(text) => { root.paths-edited(); }
                }
            }
            HorizontalBox {
                Text { text: "Output File:"; vertical-alignment: center; }
                LineEdit {
                    text <=> root.output-file;
                    edited(text) => { root.paths-edited(); }
                }
            }
            Text { text: root.full-path; }
            HorizontalBox {
                Text { text: "Output Format:"; vertical-alignment: center; }
                ComboBox {
                    model: ["markdown", "html", "json", "xml"];
                    current-value <=> root.output-format;
                }
            }
            HorizontalBox {
                Text { text: "Max File Size (bytes):"; vertical-alignment: center; }
                SpinBox {
                    minimum: 1;
                    maximum: 2147483647;
                    value <=> root.max-file-size;
                }
            }
            HorizontalBox {
                Button {
                    text: "Compile";
                    enabled: !root.is-compiling;
                    clicked => { root.compile(); }
                }
                Button {
                    text: "Clear Output";
                    clicked => { root.clear-output(); }
                }
            }
            TextEdit {
                text: root.output;
                read-only: true;
                vertical-stretch: 1;
            }
        }
    }
}

impl DisplaySurface for CompileWindow {
    fn append_line(&mut self, line: &str) -> Result<(), DisplayError> {
        let mut text = self.get_output().to_string();
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(line);
        self.set_output(text.into());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.set_output("".into());
        Ok(())
    }

    fn begin_run(&mut self, _run_id: RunId) -> Result<(), DisplayError> {
        self.clear()?;
        self.set_is_compiling(true);
        Ok(())
    }

    fn finish_run(&mut self, outcome: &TerminalOutcome) -> Result<(), DisplayError> {
        self.append_line(&outcome.summary_line())?;
        self.set_is_compiling(false);
        Ok(())
    }
}

/// Queues display jobs onto the Slint event loop.
pub struct SlintTarget<T: ComponentHandle>(pub Weak<T>);

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for SlintTarget<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl EventLoopTarget for SlintTarget<CompileWindow> {
    type Surface = CompileWindow;

    fn invoke(&self, job: DisplayJob<CompileWindow>) -> Result<(), DispatchError> {
        self.0
            .upgrade_in_event_loop(move |mut window| job(&mut window))
            .map_err(|e| DispatchError::EventLoopClosed(e.to_string()))
    }
}

/// The compile window wired to a [`TaskLauncher`]
pub struct SlintFrontend {
    window: CompileWindow,
    _bridge: EventLoopBridge<SlintTarget<CompileWindow>>,
}

impl SlintFrontend {
    pub fn new(launcher: Arc<TaskLauncher>, defaults: &RequestDefaults) -> Result<Self> {
        let window = CompileWindow::new().context("Failed to create Slint UI")?;

        window.set_project_path(defaults.project_path.as_str().into());
        window.set_output_file(defaults.output_file.as_str().into());
        window.set_output_format(defaults.output_format.as_str().into());
        window.set_max_file_size(i32::try_from(defaults.max_file_size).unwrap_or(i32::MAX));
        Self::update_full_path(&window);

        let bridge = EventLoopBridge::new(
            SlintTarget(window.as_weak()),
            Some(Arc::clone(launcher.metrics())),
        );

        Self::setup_callbacks(&window, launcher, bridge.clone_handle());

        tracing::info!("Slint front end initialized");
        Ok(Self {
            window,
            _bridge: bridge,
        })
    }

    /// Run the event loop until the window is closed.
    pub fn run(self) -> Result<()> {
        tracing::info!("Starting GUI event loop");
        self.window.run().context("Slint event loop failed")
    }

    fn setup_callbacks(window: &CompileWindow, launcher: Arc<TaskLauncher>, bridge: EventLoopBridgeHandle) {
        let weak = window.as_weak();
        window.on_paths_edited(move || {
            if let Some(window) = weak.upgrade() {
                Self::update_full_path(&window);
            }
        });

        let weak = window.as_weak();
        window.on_clear_output(move || {
            if let Some(mut window) = weak.upgrade() {
                if let Err(e) = window.clear() {
                    tracing::warn!("Failed to clear output: {}", e);
                }
            }
        });

        let weak = window.as_weak();
        window.on_compile(move || {
            let Some(mut window) = weak.upgrade() else {
                return;
            };
            tracing::info!("Compile button clicked");

            match launcher.launch(Self::read_request(&window)) {
                Ok(run) => {
                    if let Err(e) = bridge.attach(run.notifications) {
                        tracing::error!("Run {} will not be displayed: {}", run.run_id, e);
                    }
                }
                Err(e) => Self::report_launch_error(&mut window, &e),
            }
        });
    }

    fn read_request(window: &CompileWindow) -> TaskRequest {
        let format = window.get_output_format();
        let output_format = format.parse::<OutputFormat>().unwrap_or_else(|e| {
            tracing::warn!("{}; using markdown", e);
            OutputFormat::Markdown
        });

        TaskRequest::new(
            window.get_project_path().as_str(),
            window.get_output_file().as_str(),
            output_format,
            u64::try_from(window.get_max_file_size()).unwrap_or(0),
        )
    }

    fn report_launch_error(window: &mut CompileWindow, error: &LaunchError) {
        if let Err(e) = show_launch_error(window, error) {
            tracing::warn!("Failed to show launch error: {}", e);
        }
    }

    fn update_full_path(window: &CompileWindow) {
        let label = full_path_label(
            window.get_project_path().as_str(),
            window.get_output_file().as_str(),
        );
        window.set_full_path(label.into());
    }
}
