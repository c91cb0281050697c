// Polling dispatcher - drains the notification channel from the display thread
//
// The display-owning thread calls `poll` on a fixed interval (100 ms by
// default). Each poll applies everything currently queued, in order, as one
// batch. The channel is never read from any other thread in this model.

use crate::metrics::Metrics;
use crate::models::{RunId, TerminalOutcome};
use crate::task::channel::{NotificationReceiver, TryRecvError};
use crate::ui::display::{DisplayError, DisplaySurface, apply_notification};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Interval between polls of the notification channel.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Failures on the path from the channel to the display. Fatal to the affected
/// run's reporting, never to the display thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Display event loop is gone: {0}")]
    EventLoopClosed(String),

    #[error("Notification channel for run {0} closed without an outcome")]
    ChannelClosed(RunId),

    #[error("Run did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("No run is attached to the dispatcher")]
    NotAttached,

    #[error("Notification forwarder has stopped")]
    ForwarderStopped,

    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// No run attached.
    Idle,

    /// The run is still going; `applied` notifications were applied this poll.
    Pending { applied: usize },

    /// The end-of-stream marker was applied and the run detached.
    Finished(TerminalOutcome),
}

pub struct PollingDispatcher {
    current: Option<NotificationReceiver>,
    interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl PollingDispatcher {
    pub fn new(interval: Duration) -> Self {
        Self {
            current: None,
            interval,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run currently attached, if any.
    pub fn attached_run(&self) -> Option<RunId> {
        self.current.as_ref().map(NotificationReceiver::run_id)
    }

    /// Start dispatching a new run
    ///
    /// Whatever is left of the previous run is applied first, then the surface
    /// is prepared for the new run. The single-flight guard is only released
    /// once a run's outcome is queued, so the previous channel is complete by
    /// the time a new run can be attached.
    pub fn attach<S>(&mut self, rx: NotificationReceiver, surface: &mut S) -> Result<(), DispatchError>
    where
        S: DisplaySurface + ?Sized,
    {
        if let Some(previous) = self.current.take() {
            if let Err(e) = self.drain(previous, surface) {
                tracing::warn!("Discarding rest of previous run: {}", e);
            }
        }

        let run_id = rx.run_id();
        tracing::debug!("Polling dispatcher attached to run {}", run_id);
        surface.begin_run(run_id)?;
        self.current = Some(rx);
        Ok(())
    }

    /// Apply everything currently queued, in order.
    pub fn poll<S>(&mut self, surface: &mut S) -> Result<PollStatus, DispatchError>
    where
        S: DisplaySurface + ?Sized,
    {
        let Some(rx) = self.current.as_mut() else {
            return Ok(PollStatus::Idle);
        };
        let run_id = rx.run_id();

        let mut applied = 0;
        let status = loop {
            let notification = match rx.try_recv() {
                Ok(notification) => notification,
                Err(TryRecvError::Empty) => break Ok(PollStatus::Pending { applied }),
                Err(TryRecvError::Disconnected) => break Err(DispatchError::ChannelClosed(run_id)),
            };

            match apply_notification(surface, notification) {
                Ok(Some(outcome)) => {
                    applied += 1;
                    break Ok(PollStatus::Finished(outcome));
                }
                Ok(None) => applied += 1,
                Err(e) => break Err(DispatchError::from(e)),
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_dispatched(applied as u64);
        }

        match &status {
            Ok(PollStatus::Pending { .. }) => {}
            Ok(PollStatus::Finished(outcome)) => {
                tracing::debug!("Run {} dispatched: {:?}", run_id, outcome);
                self.current = None;
            }
            Ok(PollStatus::Idle) => {}
            Err(e) => {
                tracing::warn!("Dispatch for run {} failed: {}", run_id, e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_dispatch_error();
                }
                self.current = None;
            }
        }

        status
    }

    /// Poll on the interval until the attached run finishes
    ///
    /// Blocks the calling thread between polls; meant for front ends whose
    /// display thread has nothing else to do meanwhile.
    pub fn run_until_finished<S>(
        &mut self,
        surface: &mut S,
        limit: Option<Duration>,
    ) -> Result<TerminalOutcome, DispatchError>
    where
        S: DisplaySurface + ?Sized,
    {
        let deadline = limit.map(|l| Instant::now() + l);

        loop {
            match self.poll(surface)? {
                PollStatus::Finished(outcome) => return Ok(outcome),
                PollStatus::Idle => return Err(DispatchError::NotAttached),
                PollStatus::Pending { .. } => {}
            }

            if let (Some(deadline), Some(limit)) = (deadline, limit) {
                if Instant::now() >= deadline {
                    return Err(DispatchError::TimedOut(limit));
                }
            }
            std::thread::sleep(self.interval);
        }
    }

    fn drain<S>(&mut self, rx: NotificationReceiver, surface: &mut S) -> Result<(), DispatchError>
    where
        S: DisplaySurface + ?Sized,
    {
        self.current = Some(rx);
        loop {
            match self.poll(surface)? {
                PollStatus::Pending { applied: 0 } | PollStatus::Idle => break,
                PollStatus::Finished(_) => break,
                PollStatus::Pending { .. } => {}
            }
        }
        self.current = None;
        Ok(())
    }
}

impl Default for PollingDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
