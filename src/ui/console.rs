use crate::models::{DispatchMode, RunId, TaskRequest, TerminalOutcome};
use crate::task::{LaunchError, TaskLauncher};
use crate::ui::bridge::EventLoopBridge;
use crate::ui::dispatcher::{DispatchError, PollStatus, PollingDispatcher};
use crate::ui::display::{DisplayLog, DisplaySurface, show_launch_error};
use crate::ui::event_loop::{LocalEventLoop, LocalEventLoopProxy};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Dispatch {
    Polling(PollingDispatcher),
    Push(EventLoopBridge<LocalEventLoopProxy>),
}

/// Terminal front end
///
/// The thread that creates it is the display-owning thread: it owns the
/// [`DisplayLog`] (inside a [`LocalEventLoop`]) and is the only thread that
/// mutates it. New lines of the log are echoed to `out` as they appear.
pub struct ConsoleFrontend<W: Write> {
    launcher: Arc<TaskLauncher>,
    event_loop: LocalEventLoop,
    dispatch: Dispatch,
    poll_interval: Duration,
    out: W,

    /// Lines of the current log generation already written to `out`
    rendered: usize,
    rendered_generation: u64,
}

impl<W: Write> ConsoleFrontend<W> {
    pub fn new(launcher: Arc<TaskLauncher>, mode: DispatchMode, poll_interval: Duration, out: W) -> Self {
        let event_loop = LocalEventLoop::new();
        let metrics = Arc::clone(launcher.metrics());

        let dispatch = match mode {
            DispatchMode::Polling => {
                Dispatch::Polling(PollingDispatcher::new(poll_interval).with_metrics(metrics))
            }
            DispatchMode::Push => {
                Dispatch::Push(EventLoopBridge::new(event_loop.proxy(), Some(metrics)))
            }
        };

        tracing::info!("Console front end using {:?} dispatch", mode);

        Self {
            launcher,
            event_loop,
            dispatch,
            poll_interval,
            out,
            rendered: 0,
            rendered_generation: 0,
        }
    }

    pub fn launcher(&self) -> &Arc<TaskLauncher> {
        &self.launcher
    }

    pub fn log(&self) -> &DisplayLog {
        self.event_loop.log()
    }

    /// Launch a run and attach it to the dispatcher
    ///
    /// Validation failures are written to the display log as `Error: ...`; a
    /// missing project path replaces the log contents, a busy rejection leaves
    /// the running job's output in place.
    pub fn launch(&mut self, request: TaskRequest) -> Result<RunId, LaunchError> {
        let run = match self.launcher.launch(request) {
            Ok(run) => run,
            Err(e) => {
                self.report_launch_error(&e);
                return Err(e);
            }
        };

        let run_id = run.run_id;
        let attached = match &mut self.dispatch {
            Dispatch::Polling(dispatcher) => {
                dispatcher.attach(run.notifications, self.event_loop.log_mut())
            }
            Dispatch::Push(bridge) => bridge.attach(run.notifications),
        };
        if let Err(e) = attached {
            tracing::warn!("Run {} will not be displayed: {}", run_id, e);
            self.launcher.metrics().record_dispatch_error();
        }

        Ok(run_id)
    }

    /// Drive dispatch until `run_id` has finished on the display
    pub fn wait(&mut self, run_id: RunId, limit: Option<Duration>) -> Result<TerminalOutcome, DispatchError> {
        let start = Instant::now();

        loop {
            let finished = match &mut self.dispatch {
                Dispatch::Polling(dispatcher) => {
                    match dispatcher.poll(self.event_loop.log_mut())? {
                        PollStatus::Finished(outcome) => Some(outcome),
                        PollStatus::Idle => {
                            let outcome = self.displayed_outcome(run_id);
                            if outcome.is_none() {
                                return Err(DispatchError::NotAttached);
                            }
                            outcome
                        }
                        PollStatus::Pending { .. } => None,
                    }
                }
                Dispatch::Push(_) => {
                    self.event_loop.pump();
                    self.displayed_outcome(run_id)
                }
            };

            self.render_or_warn();
            if let Some(outcome) = finished {
                return Ok(outcome);
            }

            if let Some(limit) = limit {
                if start.elapsed() >= limit {
                    return Err(DispatchError::TimedOut(limit));
                }
            }

            match &self.dispatch {
                Dispatch::Polling(_) => std::thread::sleep(self.poll_interval),
                Dispatch::Push(_) => {
                    self.event_loop.pump_timeout(self.poll_interval);
                }
            }
        }
    }

    /// The "Clear Output" action.
    pub fn clear_output(&mut self) {
        if let Err(e) = self.event_loop.log_mut().clear() {
            tracing::warn!("Failed to clear output: {}", e);
        }
        self.render_or_warn();
    }

    /// Write log lines that have not been written yet.
    pub fn render(&mut self) -> std::io::Result<()> {
        let log = self.event_loop.log();
        if log.generation() != self.rendered_generation {
            self.rendered_generation = log.generation();
            self.rendered = 0;
        }

        for line in &log.lines()[self.rendered.min(log.lines().len())..] {
            writeln!(self.out, "{}", line)?;
        }
        self.rendered = log.lines().len();
        self.out.flush()
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn displayed_outcome(&self, run_id: RunId) -> Option<TerminalOutcome> {
        let log = self.event_loop.log();
        if log.current_run() == Some(run_id) {
            log.outcome().cloned()
        } else {
            None
        }
    }

    fn report_launch_error(&mut self, error: &LaunchError) {
        // Anything already queued by the running job lands before the error line
        match &mut self.dispatch {
            Dispatch::Polling(dispatcher) => {
                if let Err(e) = dispatcher.poll(self.event_loop.log_mut()) {
                    tracing::warn!("Failed to apply pending output: {}", e);
                }
            }
            Dispatch::Push(_) => {
                self.event_loop.pump();
            }
        }

        if let Err(e) = show_launch_error(self.event_loop.log_mut(), error) {
            tracing::warn!("Failed to show launch error: {}", e);
        }
        self.render_or_warn();
    }

    fn render_or_warn(&mut self) {
        if let Err(e) = self.render() {
            tracing::warn!("Failed to write console output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::models::OutputFormat;
    use crate::services::compiler::{CompileContext, CompileError};
    use crate::state::StateManager;
    use crate::task::WorkerOptions;
    use std::sync::Barrier;

    fn frontend<C>(
        rt: &tokio::runtime::Runtime,
        mode: DispatchMode,
        compiler: C,
    ) -> ConsoleFrontend<Vec<u8>>
    where
        C: Fn(&TaskRequest, &CompileContext) -> Result<(), CompileError> + Send + Sync + 'static,
    {
        let launcher = TaskLauncher::new(
            rt.handle().clone(),
            Arc::new(compiler),
            Arc::new(StateManager::new()),
            Arc::new(Metrics::new()),
        )
        .with_options(WorkerOptions {
            capture_diagnostics: false,
        });
        ConsoleFrontend::new(Arc::new(launcher), mode, Duration::from_millis(5), Vec::new())
    }

    fn request(project: &str) -> TaskRequest {
        TaskRequest::new(project, "out.md", OutputFormat::Markdown, 1_000_000)
    }

    #[test]
    fn test_missing_path_replaces_log() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut console = frontend(&rt, DispatchMode::Polling, |_req, _ctx| Ok(()));

        assert_eq!(
            console.launch(request("")),
            Err(LaunchError::MissingProjectPath)
        );
        assert_eq!(
            console.log().lines(),
            ["Error: Please specify a project path."]
        );

        let printed = String::from_utf8(console.into_output()).unwrap();
        assert_eq!(printed, "Error: Please specify a project path.\n");
    }

    #[test]
    fn test_polling_run_is_rendered() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut console = frontend(&rt, DispatchMode::Polling, |_req, ctx| {
            ctx.emit("working");
            Ok(())
        });

        let run_id = console.launch(request("/proj")).unwrap();
        let outcome = console.wait(run_id, Some(Duration::from_secs(5))).unwrap();

        assert_eq!(outcome, TerminalOutcome::Success);
        let printed = String::from_utf8(console.into_output()).unwrap();
        assert!(printed.starts_with("Starting compilation...\n"));
        assert!(printed.contains("working\n"));
        assert!(printed.ends_with("Compilation completed successfully.\n"));
    }

    #[test]
    fn test_push_run_reports_failure() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut console = frontend(&rt, DispatchMode::Push, |_req, _ctx| {
            Err(CompileError::Failed("missing manifest".into()))
        });

        let run_id = console.launch(request("/proj")).unwrap();
        let outcome = console.wait(run_id, Some(Duration::from_secs(5))).unwrap();

        assert_eq!(outcome, TerminalOutcome::Failure("missing manifest".into()));
        assert_eq!(
            console.log().last_line(),
            Some("Compilation failed: missing manifest")
        );
    }

    #[test]
    fn test_busy_rejection_keeps_running_output() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let mut console = {
            let (entered, release) = (Arc::clone(&entered), Arc::clone(&release));
            frontend(&rt, DispatchMode::Polling, move |_req, _ctx| {
                entered.wait();
                release.wait();
                Ok(())
            })
        };

        let run_id = console.launch(request("/proj")).unwrap();
        entered.wait();

        assert_eq!(
            console.launch(request("/other")),
            Err(LaunchError::Busy(run_id))
        );
        let lines = console.log().lines();
        assert_eq!(lines[0], "Starting compilation...");
        assert_eq!(lines[1], "Project Path: /proj");
        assert_eq!(
            lines.last().map(String::as_str),
            Some("Error: Compiler is busy: run #1 is still in progress.")
        );

        release.wait();
        let outcome = console.wait(run_id, Some(Duration::from_secs(5))).unwrap();

        assert_eq!(outcome, TerminalOutcome::Success);
        let lines = console.log().lines();
        assert_eq!(lines[0], "Starting compilation...");
        assert!(lines.contains(&"Error: Compiler is busy: run #1 is still in progress.".to_string()));
        assert_eq!(
            console.log().last_line(),
            Some("Compilation completed successfully.")
        );
    }

    #[test]
    fn test_clear_output() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut console = frontend(&rt, DispatchMode::Polling, |_req, _ctx| Ok(()));

        let run_id = console.launch(request("/proj")).unwrap();
        console.wait(run_id, Some(Duration::from_secs(5))).unwrap();
        console.clear_output();

        assert!(console.log().lines().is_empty());
    }
}
