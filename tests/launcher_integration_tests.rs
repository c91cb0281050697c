//! Integration tests for the task launcher
//!
//! These tests verify that:
//! - Invalid requests are rejected before any worker starts
//! - At most one run is in flight, and the guard is released by the outcome
//! - Panicking and cancelled compilers still produce exactly one outcome
//! - Run lifecycle changes are broadcast by the state manager

use contextforge_gui::models::{OutputFormat, RunId, TaskRequest, TerminalOutcome};
use contextforge_gui::services::compiler::{CompileContext, CompileError, ProjectCompiler};
use contextforge_gui::task::{
    LaunchError, Notification, NotificationReceiver, TaskLauncher, WorkerOptions,
};
use contextforge_gui::{Metrics, StateChange, StateManager};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

mock! {
    pub Compiler {}

    impl ProjectCompiler for Compiler {
        fn compile(&self, request: &TaskRequest, ctx: &CompileContext) -> Result<(), CompileError>;
    }
}

fn request(project_path: &str) -> TaskRequest {
    TaskRequest::new(project_path, "out.md", OutputFormat::Markdown, 1_000_000)
}

fn launcher_with(rt: &tokio::runtime::Runtime, compiler: Arc<dyn ProjectCompiler>) -> TaskLauncher {
    TaskLauncher::new(
        rt.handle().clone(),
        compiler,
        Arc::new(StateManager::new()),
        Arc::new(Metrics::new()),
    )
    .with_options(WorkerOptions {
        capture_diagnostics: false,
    })
}

fn launcher<C>(rt: &tokio::runtime::Runtime, compiler: C) -> TaskLauncher
where
    C: Fn(&TaskRequest, &CompileContext) -> Result<(), CompileError> + Send + Sync + 'static,
{
    launcher_with(rt, Arc::new(compiler))
}

/// Drain a run to its terminal outcome, returning the progress lines seen on the way.
fn collect(mut rx: NotificationReceiver) -> (Vec<String>, TerminalOutcome) {
    let mut lines = Vec::new();
    loop {
        match rx.blocking_recv() {
            Some(Notification::Progress(line)) => lines.push(line),
            Some(Notification::Finished(outcome)) => return (lines, outcome),
            None => panic!("run {} ended without an outcome", rx.run_id()),
        }
    }
}

#[test]
fn test_missing_project_path_never_invokes_compiler() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut compiler = MockCompiler::new();
    compiler.expect_compile().times(0);
    let launcher = launcher_with(&rt, Arc::new(compiler));

    for path in ["", "   "] {
        let err = launcher.launch(request(path)).unwrap_err();
        assert_eq!(err, LaunchError::MissingProjectPath);
        assert_eq!(err.to_string(), "Please specify a project path.");
    }

    assert!(!launcher.is_busy());
    assert_eq!(launcher.state().snapshot().runs_started, 0);
    assert_eq!(launcher.metrics().runs_rejected.load(Ordering::Relaxed), 2);
    assert_eq!(launcher.metrics().runs_launched.load(Ordering::Relaxed), 0);
}

#[test]
fn test_mock_compiler_receives_request() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut compiler = MockCompiler::new();
    compiler
        .expect_compile()
        .withf(|req, _ctx| {
            req.project_path().as_str() == "/proj" && req.output_format() == OutputFormat::Markdown
        })
        .times(1)
        .returning(|_req, ctx| {
            ctx.emit("mocked");
            Ok(())
        });
    let launcher = launcher_with(&rt, Arc::new(compiler));

    let run = launcher.launch(request("/proj")).unwrap();
    let (lines, outcome) = collect(run.notifications);

    assert_eq!(outcome, TerminalOutcome::Success);
    assert!(lines.contains(&"mocked".to_string()));
}

#[test]
fn test_busy_rejects_second_launch() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let calls = Arc::new(AtomicUsize::new(0));

    let launcher = {
        let (entered, release, calls) = (entered.clone(), release.clone(), calls.clone());
        launcher(&rt, move |_req, _ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            entered.wait();
            release.wait();
            Ok(())
        })
    };

    let first = launcher.launch(request("/proj")).unwrap();
    entered.wait();

    assert!(launcher.is_busy());
    let err = launcher.launch(request("/other")).unwrap_err();
    assert_eq!(err, LaunchError::Busy(first.run_id));

    release.wait();
    let (_, outcome) = collect(first.notifications);

    assert_eq!(outcome, TerminalOutcome::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.metrics().runs_rejected.load(Ordering::Relaxed), 1);
}

#[test]
fn test_relaunch_after_outcome() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let launcher = launcher(&rt, |req, ctx| {
        ctx.emit(&format!("compiling {}", req.project_path()));
        Ok(())
    });

    let first = launcher.launch(request("/one")).unwrap();
    let (_, outcome) = collect(first.notifications);
    assert!(outcome.is_success());
    assert!(!launcher.is_busy());

    let second = launcher.launch(request("/two")).unwrap();
    assert_eq!(second.run_id, RunId(first.run_id.0 + 1));
    let (lines, outcome) = collect(second.notifications);

    assert!(outcome.is_success());
    assert!(lines.contains(&"compiling /two".to_string()));
    assert!(!lines.iter().any(|line| line.contains("/one")));
}

#[test]
fn test_panicking_compiler_reports_failure_and_releases_guard() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let launcher = launcher(&rt, |_req, ctx| {
        ctx.emit("about to fail");
        panic!("missing manifest");
    });

    let run = launcher.launch(request("/proj")).unwrap();
    let (lines, outcome) = collect(run.notifications);

    assert!(lines.contains(&"about to fail".to_string()));
    assert!(lines.contains(&"Error: missing manifest".to_string()));
    assert_eq!(outcome, TerminalOutcome::Failure("missing manifest".into()));
    assert_eq!(outcome.summary_line(), "Compilation failed: missing manifest");
    assert!(!launcher.is_busy());
    assert_eq!(
        launcher.state().snapshot().last_outcome,
        Some(outcome.clone())
    );

    // The pipeline keeps working after a panic
    let next = launcher.launch(request("/proj"));
    assert!(next.is_ok());
}

#[test]
fn test_cancel_active_run() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let launcher = launcher(&rt, |_req, ctx| {
        ctx.emit("waiting");
        while !ctx.is_cancelled() {
            thread::sleep(Duration::from_millis(5));
        }
        Err(CompileError::Cancelled)
    });

    assert_eq!(launcher.cancel_active(), None);

    let mut run = launcher.launch(request("/proj")).unwrap();
    loop {
        match run.notifications.blocking_recv() {
            Some(Notification::Progress(line)) if line == "waiting" => break,
            Some(Notification::Progress(_)) => continue,
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    assert_eq!(launcher.cancel_active(), Some(run.run_id));
    let (lines, outcome) = collect(run.notifications);

    assert_eq!(
        outcome,
        TerminalOutcome::Failure("Compilation cancelled".into())
    );
    assert!(lines.contains(&"Error: Compilation cancelled".to_string()));
    assert_eq!(launcher.cancel_active(), None);
}

#[test]
fn test_state_changes_follow_run_lifecycle() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let launcher = launcher(&rt, |_req, _ctx| {
        Err(CompileError::Failed("bad path".into()))
    });
    let mut changes = launcher.state().subscribe();

    let run = launcher.launch(request("/proj")).unwrap();
    let run_id = run.run_id;
    let (_, outcome) = collect(run.notifications);
    assert!(!outcome.is_success());
    // Waits for the write lock that broadcast RunFinished
    assert!(!launcher.is_busy());

    assert_eq!(
        changes.try_recv().unwrap(),
        StateChange::RunStarted {
            run_id,
            project_path: "/proj".into(),
        }
    );
    assert_eq!(
        changes.try_recv().unwrap(),
        StateChange::RunFinished {
            run_id,
            success: false,
        }
    );
}
