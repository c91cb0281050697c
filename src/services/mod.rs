//! Boundary to the external compile operation.
//!
//! This module provides the framework-agnostic pieces the worker talks to:
//!
//! - [`compiler`]: The [`ProjectCompiler`] contract, [`CompileContext`] handed to it for
//!   each run, [`CompileError`], and cooperative cancellation ([`CancellationToken`])
//! - [`command`]: [`CommandCompiler`], which runs the `contextforge` CLI as a child process
//! - [`capture`]: The process-wide diagnostic sink and its scoped interceptor ([`CaptureGuard`])
//!
//! # Design Philosophy
//!
//! - **Opaque operation**: The worker only sees `compile(request, ctx) -> Result`
//! - **Injected output**: Diagnostic text goes through the context's sink, so nothing the
//!   compiler prints can reach the display except through the notification channel
//! - **No GUI dependencies**: Works under any front end, or none

pub mod capture;
pub mod command;
pub mod compiler;

pub use capture::{CaptureGuard, ConsoleSink, DiagnosticSink};
pub use command::CommandCompiler;
pub use compiler::{
    CancelHandle, CancellationToken, CompileContext, CompileError, ProjectCompiler,
};
