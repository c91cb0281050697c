//! Background execution of compile requests.
//!
//! - [`channel`]: The per-run notification channel (progress lines plus one terminal outcome)
//! - [`worker`]: Runs one request on a non-interactive thread and reports through the channel
//! - [`launcher`]: Validates requests, enforces single-flight and spawns workers
//!
//! # Threading Model
//!
//! The launcher is called from the display-owning thread and returns at once.
//! Workers run on tokio's blocking pool and never touch the display; the
//! dispatchers in [`crate::ui`] move their notifications onto the display thread.

pub mod channel;
pub mod launcher;
pub mod worker;

pub use channel::{Notification, NotificationReceiver, Notifier, OutcomeSender, notification_channel};
pub use launcher::{LaunchError, LaunchedRun, TaskLauncher};
pub use worker::{Worker, WorkerOptions};
