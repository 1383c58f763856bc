use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use patchrun::errors::PatchrunError;
use patchrun::exec::{
    BoundedLines, CaptureOptions, OutputLine, OutputStream, ProcessFuture, ProcessInvocation,
    ProcessOutput, ProcessRunner, RealProcessRunner,
};

/// Canned answer for a scripted invocation.
#[derive(Debug, Clone, Default)]
pub struct FakeResponse {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    /// Block until the invocation is cancelled instead of exiting.
    pub until_cancelled: bool,
    /// Stay "running" this long before answering.
    pub delay: Option<Duration>,
}

impl FakeResponse {
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn hang() -> Self {
        Self {
            until_cancelled: true,
            ..Self::default()
        }
    }

    /// Hold the invocation open for `delay`, so overlapping launches show up
    /// in [`FakeProcessRunner::max_concurrent`].
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn stdout<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stdout = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn stderr<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stderr = lines.into_iter().map(Into::into).collect();
        self
    }
}

struct Rule {
    needle: String,
    response: FakeResponse,
}

/// A `ProcessRunner` that never spawns anything:
/// - records every invocation it receives
/// - answers with the first rule whose needle equals the program or one of
///   the arguments, or exit code 0 with no output when nothing matches
/// - honours cancellation and capture limits like the real runner
///
/// Programs registered with [`pass_through`](Self::pass_through) are
/// launched for real, which lets pipeline tests use a real `git` next to a
/// scripted build tool.
#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    rules: Arc<Mutex<Vec<Rule>>>,
    passthrough: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<ProcessInvocation>>>,
    passed: Arc<Mutex<Vec<ProcessInvocation>>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

impl FakeProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations mentioning `needle` with `response`.
    pub fn respond(&self, needle: &str, response: FakeResponse) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            response,
        });
        self
    }

    /// Really launch `program` (e.g. `git`) instead of answering from the
    /// script. Pass-through invocations are kept apart from [`calls`](Self::calls)
    /// and counted by [`count_passed`](Self::count_passed).
    pub fn pass_through(&self, program: &str) -> &Self {
        self.passthrough.lock().unwrap().push(program.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ProcessInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded invocations mentioning `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| mentions(inv, needle))
            .count()
    }

    /// Number of pass-through invocations mentioning `needle`.
    pub fn count_passed(&self, needle: &str) -> usize {
        self.passed
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| mentions(inv, needle))
            .count()
    }

    /// Highest number of invocations that were in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn lookup(&self, invocation: &ProcessInvocation) -> FakeResponse {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| mentions(invocation, &r.needle))
            .map(|r| r.response.clone())
            .unwrap_or_default()
    }
}

fn mentions(invocation: &ProcessInvocation, needle: &str) -> bool {
    invocation.program == needle || invocation.args.iter().any(|a| a == needle)
}

fn bounded(lines: &[String], limit: Option<usize>) -> (Vec<String>, usize) {
    let mut kept = BoundedLines::new(limit);
    for line in lines {
        kept.push(line.clone());
    }
    kept.into_parts()
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, invocation: ProcessInvocation, capture: CaptureOptions) -> ProcessFuture<'_> {
        Box::pin(async move {
            if self.passthrough.lock().unwrap().contains(&invocation.program) {
                self.passed.lock().unwrap().push(invocation.clone());
                return RealProcessRunner::new().run(invocation, capture).await;
            }
            self.calls.lock().unwrap().push(invocation.clone());
            if invocation.cancel.is_cancelled() {
                return Err(PatchrunError::Cancelled);
            }

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            let response = self.lookup(&invocation);
            if response.until_cancelled {
                invocation.cancel.cancelled().await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(PatchrunError::Cancelled);
            }
            if let Some(delay) = response.delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = invocation.cancel.cancelled() => {
                        self.running.fetch_sub(1, Ordering::SeqCst);
                        return Err(PatchrunError::Cancelled);
                    }
                }
            }
            // Give other tasks a chance to overlap if the caller lets them.
            tokio::task::yield_now().await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if let Some(tx) = &capture.stream {
                for line in &response.stdout {
                    let _ = tx.send(OutputLine {
                        stream: OutputStream::Stdout,
                        line: line.clone(),
                    });
                }
            }

            let (stdout, stdout_dropped) = bounded(&response.stdout, capture.stdout_limit);
            let (stderr, stderr_dropped) = bounded(&response.stderr, capture.stderr_limit);
            Ok(ProcessOutput {
                exit_code: response.exit_code,
                signal: None,
                stdout,
                stderr,
                stdout_dropped,
                stderr_dropped,
            })
        })
    }
}
