// Worker - runs one compilation on a non-display thread
//
// The worker echoes the request, calls the compiler with capture installed and
// finishes the run's channel with exactly one outcome. A compiler panic is
// caught and reported as a failure carrying the panic message. The
// `Completion` drop path still delivers an outcome if the worker is dropped
// before running.

use crate::metrics::Metrics;
use crate::models::{TaskRequest, TerminalOutcome};
use crate::services::capture::{CaptureGuard, DiagnosticSink};
use crate::services::compiler::{CancellationToken, CompileContext, CompileError, ProjectCompiler};
use crate::state::RunGuard;
use crate::task::channel::{Notifier, OutcomeSender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Tunables for a single worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Redirect the process-wide diagnostic sink into this run's channel.
    pub capture_diagnostics: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            capture_diagnostics: true,
        }
    }
}

/// Executes one task request on the calling thread.
///
/// The worker only ever writes to its notification channel. It produces the
/// descriptive echo lines, invokes the compiler, then reports one terminal
/// outcome. A compiler panic is reported like any other failure, with the
/// panic message as its description. A worker dropped without running still
/// delivers a failure outcome.
pub struct Worker {
    request: TaskRequest,
    compiler: Arc<dyn ProjectCompiler>,
    notifier: Notifier,
    cancel: CancellationToken,
    options: WorkerOptions,
    completion: Completion,
}

impl Worker {
    pub fn new(
        request: TaskRequest,
        compiler: Arc<dyn ProjectCompiler>,
        notifier: Notifier,
        outcome_tx: OutcomeSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request,
            compiler,
            notifier,
            cancel,
            options: WorkerOptions::default(),
            completion: Completion {
                outcome_tx: Some(outcome_tx),
                run_guard: None,
                metrics: None,
                started: Instant::now(),
            },
        }
    }

    /// Retire this admission ticket together with the outcome.
    pub fn with_run_guard(mut self, guard: RunGuard) -> Self {
        self.completion.run_guard = Some(guard);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.completion.metrics = Some(metrics);
        self
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    /// Run to completion and deliver the outcome.
    ///
    /// Blocks for as long as the compiler does; call it from a worker thread.
    pub fn run(mut self) -> TerminalOutcome {
        let run_id = self.notifier.run_id();
        let span = tracing::info_span!("worker", run = %run_id);
        let _enter = span.enter();

        self.completion.started = Instant::now();
        let outcome = self.execute();
        self.completion.deliver(outcome.clone());
        outcome
    }

    fn execute(&self) -> TerminalOutcome {
        // Restored before the outcome is delivered
        let _capture = self.options.capture_diagnostics.then(|| {
            let interceptor: Arc<dyn DiagnosticSink> = Arc::new(self.notifier.clone());
            CaptureGuard::install(interceptor)
        });

        for line in self.request.describe() {
            self.notifier.progress(line);
        }

        let start = Instant::now();
        let result = if self.cancel.is_cancelled() {
            Err(CompileError::Cancelled)
        } else {
            let ctx = CompileContext::new(Arc::new(self.notifier.clone()), self.cancel.clone());
            panic::catch_unwind(AssertUnwindSafe(|| self.compiler.compile(&self.request, &ctx)))
                .unwrap_or_else(|payload| Err(CompileError::Panicked(panic_message(payload.as_ref()))))
        };

        match result {
            Ok(()) => {
                let elapsed = start.elapsed();
                tracing::info!("Compilation succeeded in {:.2}s", elapsed.as_secs_f32());
                self.notifier.progress(format!(
                    "Compilation finished in {:.2}s.",
                    elapsed.as_secs_f32()
                ));
                TerminalOutcome::Success
            }
            Err(e) => {
                tracing::error!("Compilation failed: {}", e);
                self.notifier.progress(format!("Error: {}", e));
                for cause in e.trace() {
                    self.notifier.progress(format!("    caused by: {}", cause));
                }
                TerminalOutcome::Failure(e.to_string())
            }
        }
    }
}

/// Text of a panic payload raised with `panic!("...")`.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "compiler panicked".to_string()
    }
}

/// Delivers the terminal outcome exactly once.
///
/// The outcome is queued and the run guard released under the same state lock.
/// Dropping an undelivered completion reports a failure, which covers panics
/// and workers that never ran.
struct Completion {
    outcome_tx: Option<OutcomeSender>,
    run_guard: Option<RunGuard>,
    metrics: Option<Arc<Metrics>>,
    started: Instant,
}

impl Completion {
    fn deliver(&mut self, outcome: TerminalOutcome) {
        let Some(outcome_tx) = self.outcome_tx.take() else {
            return;
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(outcome.is_success(), self.started.elapsed());
        }

        match self.run_guard.take() {
            Some(guard) => guard.complete(&outcome, || outcome_tx.finish(outcome.clone())),
            None => outcome_tx.finish(outcome),
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.outcome_tx.is_none() {
            return;
        }

        let detail = if std::thread::panicking() {
            "compilation worker panicked"
        } else {
            "compilation worker exited without reporting an outcome"
        };
        tracing::error!("{}", detail);
        self.deliver(TerminalOutcome::Failure(detail.to_string()));
    }
}
