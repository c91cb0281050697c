// Output capture - process-wide diagnostic sink with scoped interception
//
// The external compiler may write incidental diagnostic text through `emit()`.
// While a worker holds a `CaptureGuard`, those writes are forwarded to the
// worker's notification channel instead of the console. The slot is guarded
// by a mutex so at most one worker intercepts at a time, and the saved sink
// is put back in `Drop` on every exit path, unwinding included.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};

/// Destination for diagnostic text lines.
pub trait DiagnosticSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// The default sink: plain lines on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl DiagnosticSink for ConsoleSink {
    fn write_line(&self, line: &str) {
        let mut out = io::stdout().lock();
        // Nothing sensible to do if stdout is gone
        let _ = writeln!(out, "{}", line);
    }
}

/// Held for as long as a capture is installed; serializes interceptors.
static CAPTURE_LOCK: Mutex<()> = Mutex::new(());

static CAPTURING: AtomicBool = AtomicBool::new(false);

static ACTIVE_SINK: OnceLock<RwLock<Arc<dyn DiagnosticSink>>> = OnceLock::new();

fn slot() -> &'static RwLock<Arc<dyn DiagnosticSink>> {
    ACTIVE_SINK.get_or_init(|| RwLock::new(Arc::new(ConsoleSink)))
}

/// Write one diagnostic line to whichever sink is currently installed.
pub fn emit(line: &str) {
    // Clone out of the lock so a sink that emits again cannot deadlock
    let sink = current_sink();
    sink.write_line(line);
}

/// The sink `emit()` currently writes to.
pub fn current_sink() -> Arc<dyn DiagnosticSink> {
    slot()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// True while some worker holds a [`CaptureGuard`].
pub fn is_capturing() -> bool {
    CAPTURING.load(Ordering::SeqCst)
}

/// Scoped interception of the process-wide diagnostic sink.
///
/// `install` blocks until no other guard is alive, saves the current sink and
/// installs the interceptor. Dropping the guard restores the saved sink exactly
/// once and only then releases the capture lock.
pub struct CaptureGuard {
    previous: Option<Arc<dyn DiagnosticSink>>,
    _lock: MutexGuard<'static, ()>,
}

impl CaptureGuard {
    pub fn install(interceptor: Arc<dyn DiagnosticSink>) -> Self {
        // A worker that panicked while capturing has already restored the sink in Drop
        let lock = CAPTURE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = {
            let mut active = slot().write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, interceptor)
        };
        CAPTURING.store(true, Ordering::SeqCst);

        tracing::debug!("Diagnostic sink intercepted");

        Self {
            previous: Some(previous),
            _lock: lock,
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let mut active = slot().write().unwrap_or_else(PoisonError::into_inner);
            *active = previous;
            CAPTURING.store(false, Ordering::SeqCst);
            tracing::debug!("Diagnostic sink restored");
        }
    }
}
