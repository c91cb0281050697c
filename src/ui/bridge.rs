// EventLoopBridge - Forwards worker notifications onto the display event loop
//
// This is the push model of notification dispatch. Workers run on tokio's
// blocking pool and must never touch the display; the display thread must
// never block on a worker. The bridge sits between them:
// 1. A launched run's receiver is attached to the bridge
// 2. One long-lived forwarder thread takes attached runs in order
// 3. Each notification is wrapped in a closure and queued onto the display
//    thread through the `EventLoopTarget`
//
// Runs are forwarded strictly one after another, and a run's `begin_run`
// travels the same path as its messages, so nothing from one run can be
// applied after the next run has cleared the display.

use crate::metrics::Metrics;
use crate::task::channel::{Notification, NotificationReceiver};
use crate::ui::dispatcher::DispatchError;
use crate::ui::display::{DisplaySurface, apply_notification};
use crate::ui::event_loop::EventLoopTarget;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// Forwards attached runs to a display event loop
///
/// # Example
/// ```ignore
/// let bridge = EventLoopBridge::new(event_loop.proxy(), Some(metrics));
/// let run = launcher.launch(request)?;
/// bridge.attach(run.notifications)?;
/// event_loop.run_until(|log| log.outcome().is_some(), None)?;
/// ```
pub struct EventLoopBridge<E: EventLoopTarget> {
    target: E,

    /// Unbounded: a slow display delays updates but never drops them
    runs_tx: mpsc::UnboundedSender<NotificationReceiver>,

    forwarder: JoinHandle<()>,
}

impl<E: EventLoopTarget> EventLoopBridge<E> {
    /// Create a bridge and start its forwarder thread.
    pub fn new(target: E, metrics: Option<Arc<Metrics>>) -> Self {
        let (runs_tx, runs_rx) = mpsc::unbounded_channel();

        let forward_target = target.clone();
        let forwarder = std::thread::spawn(move || forward_runs(forward_target, runs_rx, metrics));

        Self {
            target,
            runs_tx,
            forwarder,
        }
    }

    /// Queue a run for forwarding. Returns immediately.
    pub fn attach(&self, run: NotificationReceiver) -> Result<(), DispatchError> {
        self.clone_handle().attach(run)
    }

    pub fn target(&self) -> &E {
        &self.target
    }

    /// False once the forwarder thread has exited.
    pub fn is_forwarding(&self) -> bool {
        !self.forwarder.is_finished()
    }

    /// Cloneable handle for attaching runs from UI callbacks.
    pub fn clone_handle(&self) -> EventLoopBridgeHandle {
        EventLoopBridgeHandle {
            runs_tx: self.runs_tx.clone(),
        }
    }
}

/// Lightweight handle that can be cloned and passed to callbacks
#[derive(Clone)]
pub struct EventLoopBridgeHandle {
    runs_tx: mpsc::UnboundedSender<NotificationReceiver>,
}

impl EventLoopBridgeHandle {
    pub fn attach(&self, run: NotificationReceiver) -> Result<(), DispatchError> {
        let run_id = run.run_id();
        self.runs_tx.send(run).map_err(|_| {
            tracing::warn!("Cannot forward run {}: forwarder has stopped", run_id);
            DispatchError::ForwarderStopped
        })
    }
}

fn forward_runs<E: EventLoopTarget>(
    target: E,
    mut runs_rx: mpsc::UnboundedReceiver<NotificationReceiver>,
    metrics: Option<Arc<Metrics>>,
) {
    tracing::debug!("EventLoopBridge forwarder thread started");

    while let Some(run) = runs_rx.blocking_recv() {
        if let Err(e) = forward_run(&target, run, metrics.as_ref()) {
            tracing::warn!("Stopping notification forwarder: {}", e);
            if let Some(metrics) = &metrics {
                metrics.record_dispatch_error();
            }
            // The display loop is gone; nothing else can be delivered
            if matches!(e, DispatchError::EventLoopClosed(_)) {
                break;
            }
        }
    }

    tracing::debug!("EventLoopBridge forwarder thread terminated");
}

fn forward_run<E: EventLoopTarget>(
    target: &E,
    mut run: NotificationReceiver,
    metrics: Option<&Arc<Metrics>>,
) -> Result<(), DispatchError> {
    let run_id = run.run_id();
    tracing::debug!("Forwarding run {}", run_id);

    target.invoke(Box::new(move |surface: &mut E::Surface| {
        if let Err(e) = surface.begin_run(run_id) {
            tracing::warn!("Failed to prepare display for run {}: {}", run_id, e);
        }
    }))?;

    loop {
        let Some(notification) = run.blocking_recv() else {
            return Err(DispatchError::ChannelClosed(run_id));
        };
        let finished = matches!(notification, Notification::Finished(_));

        let metrics = metrics.cloned();
        target.invoke(Box::new(move |surface: &mut E::Surface| {
            match apply_notification(surface, notification) {
                Ok(_) => {
                    if let Some(metrics) = metrics {
                        metrics.record_dispatched(1);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to apply notification for run {}: {}", run_id, e);
                    if let Some(metrics) = metrics {
                        metrics.record_dispatch_error();
                    }
                }
            }
        }))?;

        if finished {
            return Ok(());
        }
    }
}
