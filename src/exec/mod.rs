// src/exec/mod.rs

//! Process execution layer.
//!
//! Everything the pipeline launches (git, the build tool, patcher binaries)
//! goes through a [`ProcessRunner`]:
//!
//! - [`lines`] holds [`BoundedLines`], which caps captured output at the
//!   reader so a runaway child can't grow memory without bound.
//! - [`process`] runs a single child with `tokio::process`, streaming its
//!   stdout/stderr line by line and killing it when the invocation's
//!   cancellation token fires.
//! - [`backend`] provides the `ProcessRunner` trait and the production
//!   `RealProcessRunner`; tests replace it with a scripted fake.

use std::fmt;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod lines;
pub mod process;

pub use backend::{ProcessFuture, ProcessRunner, RealProcessRunner};
pub use lines::BoundedLines;

/// One launch of an external program.
///
/// Built fresh for every call and consumed by the runner.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Text written to the child's stdin, which is closed afterwards.
    pub stdin: Option<String>,
    pub cancel: CancellationToken,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            stdin: None,
            cancel,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for ProcessInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A single line of live output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// How much output to keep and where to stream it.
///
/// `None` limits keep everything. Streaming sees every line, including the
/// ones dropped from the retained capture.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub stdout_limit: Option<usize>,
    pub stderr_limit: Option<usize>,
    pub stream: Option<mpsc::UnboundedSender<OutputLine>>,
}

impl CaptureOptions {
    /// Keep everything.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Keep at most `max_lines` lines of each stream.
    pub fn limited(max_lines: usize) -> Self {
        Self {
            stdout_limit: Some(max_lines),
            stderr_limit: Some(max_lines),
            stream: None,
        }
    }

    pub fn with_stream(mut self, tx: mpsc::UnboundedSender<OutputLine>) -> Self {
        self.stream = Some(tx);
        self
    }
}

/// Exit code reported for a process terminated by a signal.
///
/// Outside every code a patcher can exit with, so it decodes as an unknown
/// code instead of passing for a protocol answer.
pub const KILLED_BY_SIGNAL: i32 = i32::MIN;

/// Result of a process that ran to exit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Raw exit code; [`KILLED_BY_SIGNAL`] when the process was terminated by
    /// a signal.
    pub exit_code: i32,
    /// Signal that terminated the process, if any.
    pub signal: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub stdout_dropped: usize,
    pub stderr_dropped: usize,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
