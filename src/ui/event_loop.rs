// Display-thread event loops
//
// `EventLoopTarget` is the thread-marshaling primitive of the push model: it
// queues a closure that will run on the display-owning thread with mutable
// access to that thread's display surface. The Slint front end implements it
// with `Weak::upgrade_in_event_loop`; the console front end uses the
// `LocalEventLoop` below.

use crate::ui::dispatcher::DispatchError;
use crate::ui::display::{DisplayLog, DisplaySurface};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// A closure to run on the display-owning thread.
pub type DisplayJob<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Handle for queueing work onto a display-owning thread from any thread.
pub trait EventLoopTarget: Clone + Send + 'static {
    type Surface: DisplaySurface;

    /// Queue `job` to run on the display thread. Never runs it inline.
    fn invoke(&self, job: DisplayJob<Self::Surface>) -> Result<(), DispatchError>;
}

/// Event loop of the console front end
///
/// Owns the [`DisplayLog`] and is driven by the thread that created it: queued
/// jobs only run inside [`pump`](Self::pump), [`pump_timeout`](Self::pump_timeout)
/// or [`run_until`](Self::run_until).
pub struct LocalEventLoop {
    log: DisplayLog,
    jobs_tx: mpsc::Sender<DisplayJob<DisplayLog>>,
    jobs_rx: mpsc::Receiver<DisplayJob<DisplayLog>>,
}

impl LocalEventLoop {
    /// Create an event loop (and its log) owned by the calling thread.
    pub fn new() -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel();
        Self {
            log: DisplayLog::new(),
            jobs_tx,
            jobs_rx,
        }
    }

    pub fn proxy(&self) -> LocalEventLoopProxy {
        LocalEventLoopProxy {
            jobs_tx: self.jobs_tx.clone(),
        }
    }

    pub fn log(&self) -> &DisplayLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut DisplayLog {
        &mut self.log
    }

    /// Run every job queued so far, without blocking.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.jobs_rx.try_recv() {
            job(&mut self.log);
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for a job, then run everything queued.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.jobs_rx.recv_timeout(timeout) {
            Ok(job) => {
                job(&mut self.log);
                1 + self.pump()
            }
            // We hold a sender ourselves, so this is always a timeout
            Err(_) => 0,
        }
    }

    /// Run jobs until `done` holds for the log or `limit` elapses.
    pub fn run_until<F>(&mut self, mut done: F, limit: Option<Duration>) -> Result<(), DispatchError>
    where
        F: FnMut(&DisplayLog) -> bool,
    {
        let start = Instant::now();

        loop {
            self.pump();
            if done(&self.log) {
                return Ok(());
            }

            match limit {
                Some(limit) => {
                    let elapsed = start.elapsed();
                    if elapsed >= limit {
                        return Err(DispatchError::TimedOut(limit));
                    }
                    self.pump_timeout(limit - elapsed);
                }
                None => {
                    if let Ok(job) = self.jobs_rx.recv() {
                        job(&mut self.log);
                    }
                }
            }
        }
    }
}

impl Default for LocalEventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Sendable handle that queues jobs onto a [`LocalEventLoop`].
#[derive(Clone)]
pub struct LocalEventLoopProxy {
    jobs_tx: mpsc::Sender<DisplayJob<DisplayLog>>,
}

impl EventLoopTarget for LocalEventLoopProxy {
    type Surface = DisplayLog;

    fn invoke(&self, job: DisplayJob<DisplayLog>) -> Result<(), DispatchError> {
        self.jobs_tx
            .send(job)
            .map_err(|_| DispatchError::EventLoopClosed("local event loop has stopped".into()))
    }
}
