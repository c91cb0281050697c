// Task launcher - validates requests and admits one run at a time
//
// `launch` rejects an empty project path, takes the single-flight guard from
// the state manager and hands the run to tokio's blocking pool. The caller
// gets the run's notification receiver back immediately.

use crate::metrics::Metrics;
use crate::models::{RunId, TaskRequest};
use crate::services::compiler::{CancelHandle, CancellationToken, ProjectCompiler};
use crate::state::StateManager;
use crate::task::channel::{NotificationReceiver, notification_channel};
use crate::task::worker::{Worker, WorkerOptions};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Validation failures reported synchronously by [`TaskLauncher::launch`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Please specify a project path.")]
    MissingProjectPath,

    #[error("Compiler is busy: run {0} is still in progress.")]
    Busy(RunId),
}

/// Handle to a run that was admitted and handed to a worker.
#[derive(Debug)]
pub struct LaunchedRun {
    pub run_id: RunId,

    /// Everything the worker reports, ending with the terminal outcome.
    pub notifications: NotificationReceiver,
}

/// Starts background compilations
///
/// `launch` validates the request, admits it through the single-flight guard
/// and starts one worker on tokio's blocking pool. It never waits on the
/// compiler; everything the worker produces arrives through the returned
/// [`LaunchedRun::notifications`].
///
/// # Example
/// ```ignore
/// let launcher = TaskLauncher::new(runtime.handle().clone(), compiler, state, metrics);
/// let run = launcher.launch(request)?;
/// dispatcher.attach(run.notifications, &mut log)?;
/// ```
pub struct TaskLauncher {
    runtime: tokio::runtime::Handle,
    compiler: Arc<dyn ProjectCompiler>,
    state: Arc<StateManager>,
    metrics: Arc<Metrics>,
    options: WorkerOptions,

    /// Cancel handle of the most recently launched run
    active_cancel: Arc<Mutex<Option<(RunId, CancelHandle)>>>,
}

impl TaskLauncher {
    pub fn new(
        runtime: tokio::runtime::Handle,
        compiler: Arc<dyn ProjectCompiler>,
        state: Arc<StateManager>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            runtime,
            compiler,
            state,
            metrics,
            options: WorkerOptions::default(),
            active_cancel: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate and start one background run
    ///
    /// Returns immediately. On error no worker is started and no notification
    /// is produced.
    pub fn launch(&self, request: TaskRequest) -> Result<LaunchedRun, LaunchError> {
        if request.is_missing_project_path() {
            tracing::warn!("Launch rejected: no project path");
            self.metrics.record_rejection();
            return Err(LaunchError::MissingProjectPath);
        }

        let guard = self.state.try_begin_run(&request).map_err(|active| {
            tracing::warn!("Launch rejected: run {} still in progress", active);
            self.metrics.record_rejection();
            LaunchError::Busy(active)
        })?;

        let run_id = guard.run_id();
        let (notifier, outcome_tx, notifications) = notification_channel(run_id);
        let (cancel_handle, cancel) = CancellationToken::new();
        *self
            .active_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((run_id, cancel_handle));

        let worker = Worker::new(
            request,
            Arc::clone(&self.compiler),
            notifier,
            outcome_tx,
            cancel,
        )
        .with_run_guard(guard)
        .with_metrics(Arc::clone(&self.metrics))
        .with_options(self.options);

        self.metrics.record_launch();
        tracing::info!("Starting worker for run {}", run_id);

        // If the runtime is shutting down the closure is dropped unrun and the
        // worker reports a failure from its drop path.
        let handle = self.runtime.spawn_blocking(move || worker.run());
        self.runtime.spawn(async move {
            match handle.await {
                Ok(outcome) => {
                    tracing::debug!("Worker for run {} exited: {:?}", run_id, outcome)
                }
                Err(e) if e.is_panic() => {
                    tracing::error!("Worker for run {} panicked", run_id)
                }
                Err(e) => tracing::warn!("Worker for run {} did not complete: {}", run_id, e),
            }
        });

        Ok(LaunchedRun {
            run_id,
            notifications,
        })
    }

    /// Request cooperative cancellation of the run in flight
    ///
    /// Returns the id of the run that was signalled, if any.
    pub fn cancel_active(&self) -> Option<RunId> {
        let active = self.state.read(|state| state.active_run)?;
        let slot = self
            .active_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match slot.as_ref() {
            Some((run_id, handle)) if *run_id == active => {
                tracing::info!("Cancelling run {}", run_id);
                handle.cancel();
                Some(*run_id)
            }
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.read(|state| state.is_compiling)
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
