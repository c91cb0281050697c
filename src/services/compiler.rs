// Compiler boundary - the blocking operation a worker runs
//
// `ProjectCompiler` is what the launcher is generic over; closures implement
// it too. `CompileContext` hands the compiler its diagnostic sink and a
// cancellation token.

use crate::models::TaskRequest;
use crate::services::capture::DiagnosticSink;
use camino::Utf8PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Errors the external compiler can raise
#[derive(Error, Debug)]
pub enum CompileError {
    /// A plain human-readable failure reported by the compiler
    #[error("{0}")]
    Failed(String),

    #[error("Project path does not exist: {0}")]
    ProjectNotFound(Utf8PathBuf),

    #[error("Failed to start compiler '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message} (compiler exited with {status})")]
    ProcessFailed { status: String, message: String },

    #[error("Compilation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Compilation cancelled")]
    Cancelled,

    /// The compiler panicked; carries the panic message
    #[error("{0}")]
    Panicked(String),

    #[error("Process error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CompileError {
    /// Descriptions of the underlying causes, outermost first.
    pub fn trace(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        causes
    }
}

/// Requests cooperative cancellation of one run.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace stores the flag even when no token is listening yet
        self.tx.send_replace(true);
    }
}

/// Observed by the compiler at its natural suspension points.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> (CancelHandle, CancellationToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancellationToken { rx })
    }

    /// A token nobody can cancel.
    pub fn never() -> Self {
        let (_, token) = Self::new();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if it never can be.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

/// What the worker hands to the compiler for one run.
pub struct CompileContext {
    diagnostics: Arc<dyn DiagnosticSink>,
    cancel: CancellationToken,
}

impl CompileContext {
    pub fn new(diagnostics: Arc<dyn DiagnosticSink>, cancel: CancellationToken) -> Self {
        Self {
            diagnostics,
            cancel,
        }
    }

    /// Forward one line of diagnostic output to the run's log.
    pub fn emit(&self, line: &str) {
        self.diagnostics.write_line(line);
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.diagnostics
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The external compile operation.
///
/// Implementations block for as long as the compilation takes; they are always
/// invoked from a worker thread, never from the display-owning thread.
pub trait ProjectCompiler: Send + Sync {
    fn compile(&self, request: &TaskRequest, ctx: &CompileContext) -> Result<(), CompileError>;
}

impl<F> ProjectCompiler for F
where
    F: Fn(&TaskRequest, &CompileContext) -> Result<(), CompileError> + Send + Sync,
{
    fn compile(&self, request: &TaskRequest, ctx: &CompileContext) -> Result<(), CompileError> {
        self(request, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_trace_walks_sources() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("manifest.toml not found"));
        let err = CompileError::from(inner.context("failed to read project manifest").unwrap_err());

        assert_eq!(err.to_string(), "failed to read project manifest");
        assert_eq!(err.trace(), vec!["manifest.toml not found"]);
    }

    #[test]
    fn test_plain_failure_has_no_trace() {
        let err = CompileError::Failed("bad path".into());
        assert_eq!(err.to_string(), "bad path");
        assert!(err.trace().is_empty());
    }

    #[test]
    fn test_cancel_handle_flips_token() {
        let (handle, token) = CancellationToken::new();
        let observer = token.clone();
        assert!(!token.is_cancelled());

        handle.cancel();

        assert!(token.is_cancelled());
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_never_token_stays_clear() {
        assert!(!CancellationToken::never().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let (handle, token) = CancellationToken::new();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancellation not observed")
            .unwrap();
    }
}
