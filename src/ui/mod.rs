// UI module - display surfaces, notification dispatch and front ends
//
// This module contains:
// - DisplaySurface / DisplayLog: the thread-bound output log
// - PollingDispatcher: drains the notification channel on an interval (polling model)
// - EventLoopBridge: forwards notifications onto a display event loop (push model)
// - LocalEventLoop: the console front end's display-owning event loop
// - ConsoleFrontend / SlintFrontend: the two front ends

pub mod bridge;
pub mod console;
pub mod dispatcher;
pub mod display;
pub mod event_loop;
#[cfg(feature = "slint-frontend")]
pub mod slint_frontend;

pub use bridge::{EventLoopBridge, EventLoopBridgeHandle};
pub use console::ConsoleFrontend;
pub use dispatcher::{DEFAULT_POLL_INTERVAL, DispatchError, PollStatus, PollingDispatcher};
pub use display::{DisplayError, DisplayLog, DisplaySurface, apply_notification, show_launch_error};
pub use event_loop::{DisplayJob, EventLoopTarget, LocalEventLoop, LocalEventLoopProxy};
#[cfg(feature = "slint-frontend")]
pub use slint_frontend::{CompileWindow, SlintFrontend, SlintTarget};
