// Notification channel - one per launched run
//
// Progress lines and the single terminal outcome travel from the worker to the
// dispatcher over an unbounded tokio mpsc channel. The producer side is split
// in two: `Notifier` (cloneable, progress only) and `OutcomeSender` (unique,
// consumed by `finish`). Both share one slot holding the real sender; `finish`
// takes it out under the slot's lock, so once the outcome is queued no
// progress line can follow it and the receiver sees the stream end.

use crate::models::{RunId, TerminalOutcome};
use crate::services::capture::DiagnosticSink;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

pub use tokio::sync::mpsc::error::TryRecvError;

/// One item on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// One line of worker output, applied verbatim to the display log.
    Progress(String),

    /// End-of-stream marker; always the last item of a run.
    Finished(TerminalOutcome),
}

type SenderSlot = Arc<Mutex<Option<mpsc::UnboundedSender<Notification>>>>;

/// Create the channel for one run.
pub fn notification_channel(run_id: RunId) -> (Notifier, OutcomeSender, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let slot: SenderSlot = Arc::new(Mutex::new(Some(tx)));

    (
        Notifier {
            run_id,
            slot: Arc::clone(&slot),
        },
        OutcomeSender {
            run_id,
            slot,
            sent: false,
        },
        NotificationReceiver {
            run_id,
            rx,
            finished: false,
        },
    )
}

/// Producer handle for progress lines.
#[derive(Clone)]
pub struct Notifier {
    run_id: RunId,
    slot: SenderSlot,
}

impl Notifier {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Queue one progress line.
    ///
    /// Returns false when the line was dropped because the outcome has already
    /// been sent or the receiver is gone.
    pub fn progress(&self, line: impl Into<String>) -> bool {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = slot.as_ref() else {
            tracing::debug!("Run {}: progress after outcome dropped", self.run_id);
            return false;
        };

        if tx.send(Notification::Progress(line.into())).is_err() {
            tracing::debug!("Run {}: receiver gone, progress dropped", self.run_id);
            return false;
        }
        true
    }

    /// True once the outcome has been queued.
    pub fn is_closed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl DiagnosticSink for Notifier {
    fn write_line(&self, line: &str) {
        self.progress(line);
    }
}

/// Producer handle for the terminal outcome. Exactly one outcome leaves it.
pub struct OutcomeSender {
    run_id: RunId,
    slot: SenderSlot,
    sent: bool,
}

impl OutcomeSender {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Queue the terminal outcome and close the channel to producers.
    pub fn finish(mut self, outcome: TerminalOutcome) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: TerminalOutcome) {
        if self.sent {
            return;
        }
        self.sent = true;

        let tx = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match tx {
            Some(tx) => {
                if tx.send(Notification::Finished(outcome)).is_err() {
                    tracing::warn!("Run {}: receiver gone before outcome", self.run_id);
                }
            }
            None => tracing::error!("Run {}: outcome slot already closed", self.run_id),
        }
    }
}

impl Drop for OutcomeSender {
    fn drop(&mut self) {
        if self.sent {
            return;
        }

        let detail = if std::thread::panicking() {
            "compilation worker panicked"
        } else {
            "compilation worker exited without reporting an outcome"
        };
        tracing::error!("Run {}: {}", self.run_id, detail);
        self.send(TerminalOutcome::Failure(detail.to_string()));
    }
}

/// Consumer end, owned by the dispatcher.
#[derive(Debug)]
pub struct NotificationReceiver {
    run_id: RunId,
    rx: mpsc::UnboundedReceiver<Notification>,
    finished: bool,
}

impl NotificationReceiver {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// True once the end-of-stream marker has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn try_recv(&mut self) -> Result<Notification, TryRecvError> {
        let item = self.rx.try_recv()?;
        self.observe(&item);
        Ok(item)
    }

    /// Block the calling thread for the next item. Must not be called from
    /// inside an async context.
    pub fn blocking_recv(&mut self) -> Option<Notification> {
        let item = self.rx.blocking_recv()?;
        self.observe(&item);
        Some(item)
    }

    pub async fn recv(&mut self) -> Option<Notification> {
        let item = self.rx.recv().await?;
        self.observe(&item);
        Some(item)
    }

    fn observe(&mut self, item: &Notification) {
        if matches!(item, Notification::Finished(_)) {
            self.finished = true;
        }
    }
}
