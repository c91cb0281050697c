//! Data models for the ContextForge GUI.
//!
//! This module contains the values that flow through the compile pipeline:
//! - [`TaskRequest`]: Immutable parameters for one compilation attempt
//! - [`OutputFormat`]: The closed set of formats the external compiler produces
//! - [`TerminalOutcome`]: The single success/failure result of a launched run
//! - [`RunId`]: Sequence number tagging every launched run
//! - [`GuiConfig`]: Settings and request defaults loaded from `ContextForge GUI.yaml`

pub mod config;
pub mod outcome;
pub mod request;

pub use config::{DispatchMode, FrontendKind, GuiConfig, GuiSettings, RequestDefaults};
pub use outcome::{RunId, SUCCESS_SUMMARY, TerminalOutcome};
pub use request::{
    DEFAULT_MAX_FILE_SIZE, OutputFormat, TaskRequest, UnknownFormat, full_path_label,
};
