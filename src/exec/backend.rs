// src/exec/backend.rs

//! Pluggable process runner abstraction.
//!
//! Git, the build tool and patcher binaries are all launched through a
//! `ProcessRunner` instead of `tokio::process` directly. This makes it easy to
//! swap in a scripted runner in tests while production code uses
//! [`RealProcessRunner`].
//!
//! - `RealProcessRunner` spawns real OS processes via
//!   [`run_process`](super::process::run_process).
//! - Tests can provide their own `ProcessRunner` that records invocations
//!   and returns canned exit codes and output lines.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::Result;
use crate::exec::process::run_process;
use crate::exec::{CaptureOptions, ProcessInvocation, ProcessOutput};

/// Boxed future returned by [`ProcessRunner::run`].
pub type ProcessFuture<'a> = Pin<Box<dyn Future<Output = Result<ProcessOutput>> + Send + 'a>>;

/// Trait abstracting how external processes are executed.
pub trait ProcessRunner: Send + Sync {
    /// Run `invocation` to exit, honouring its cancellation token.
    ///
    /// Implementations must return `PatchrunError::Cancelled` (and tear the
    /// process down) when the token fires before the process exits.
    fn run(&self, invocation: ProcessInvocation, capture: CaptureOptions) -> ProcessFuture<'_>;

    /// Run and keep all output.
    fn run_and_capture(&self, invocation: ProcessInvocation) -> ProcessFuture<'_> {
        self.run(invocation, CaptureOptions::unbounded())
    }
}

impl<T: ProcessRunner + ?Sized> ProcessRunner for Arc<T> {
    fn run(&self, invocation: ProcessInvocation, capture: CaptureOptions) -> ProcessFuture<'_> {
        (**self).run(invocation, capture)
    }
}

/// Real process runner used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealProcessRunner;

impl RealProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for RealProcessRunner {
    fn run(&self, invocation: ProcessInvocation, capture: CaptureOptions) -> ProcessFuture<'_> {
        Box::pin(run_process(invocation, capture))
    }
}
