// src/protocol/runnability.rs

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::WorkQueue;
use crate::errors::{PatchrunError, Result};
use crate::exec::{CaptureOptions, ProcessRunner};
use crate::protocol::codes::ExitCode;
use crate::protocol::meta::{BuildMeta, BuildMetaStore, MetaLocation};
use crate::protocol::query::{RunnabilityQuery, StartInfoProvider};

/// Lines of patcher output kept for the failure reason.
pub const MAX_CAPTURED_LINES: usize = 100;

/// Answer to a runnability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnabilityOutcome {
    /// Not launched: the build meta says this build has no check.
    ShortCircuited,
    /// The patcher exited with anything but `NotRunnable`.
    Runnable(ExitCode),
    /// The patcher refused; the reason is its captured output.
    NotRunnable(String),
}

impl RunnabilityOutcome {
    pub fn is_runnable(&self) -> bool {
        !matches!(self, RunnabilityOutcome::NotRunnable(_))
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            RunnabilityOutcome::NotRunnable(reason) => Err(PatchrunError::NotRunnable(reason)),
            _ => Ok(()),
        }
    }
}

/// Asks a patcher whether it can run against the current environment.
///
/// Launches go through the patcher's [`WorkQueue`]. Exit codes outside the
/// known set count as runnable: a patcher that never implemented the check
/// must not be blocked by it.
#[derive(Clone)]
pub struct RunnabilityChecker {
    runner: Arc<dyn ProcessRunner>,
    queue: Arc<WorkQueue>,
    start: StartInfoProvider,
    meta: BuildMetaStore,
    short_circuit: bool,
    max_lines: usize,
}

impl fmt::Debug for RunnabilityChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnabilityChecker")
            .field("queue", &self.queue)
            .field("short_circuit", &self.short_circuit)
            .field("max_lines", &self.max_lines)
            .finish_non_exhaustive()
    }
}

impl RunnabilityChecker {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        queue: Arc<WorkQueue>,
        start: StartInfoProvider,
        meta: BuildMetaStore,
    ) -> Self {
        Self {
            runner,
            queue,
            start,
            meta,
            short_circuit: true,
            max_lines: MAX_CAPTURED_LINES,
        }
    }

    /// Honour a cached "does not have runnability" flag.
    pub fn with_short_circuit(mut self, enabled: bool) -> Self {
        self.short_circuit = enabled;
        self
    }

    /// Lines kept for the failure reason, clamped to `1..=MAX_CAPTURED_LINES`.
    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines.clamp(1, MAX_CAPTURED_LINES);
        self
    }

    pub async fn check(
        &self,
        path: &Path,
        direct_exe: bool,
        query: &RunnabilityQuery,
        meta: Option<&MetaLocation>,
        cancel: &CancellationToken,
    ) -> Result<RunnabilityOutcome> {
        let cached = meta.and_then(|location| self.meta.read_for(location));
        if self.short_circuit && cached.as_ref().is_some_and(|m| m.does_not_have_runnability) {
            info!(?path, "skipping runnability check (cached as not implemented)");
            return Ok(RunnabilityOutcome::ShortCircuited);
        }

        let invocation = self.start.start(path, direct_exe, query, false, cancel.clone());
        let capture = CaptureOptions::limited(self.max_lines);
        let runner = Arc::clone(&self.runner);
        debug!(%invocation, "checking runnability");

        let output = self
            .queue
            .enqueue(cancel, move |token| async move {
                let mut invocation = invocation;
                invocation.cancel = token;
                runner.run(invocation, capture).await
            })
            .await?;

        let code = ExitCode::from_raw(output.exit_code);
        match code {
            ExitCode::NotRunnable => {
                let reason = output.stdout.join("\n");
                info!(?path, %reason, "patcher reported not runnable");
                Ok(RunnabilityOutcome::NotRunnable(reason))
            }
            ExitCode::NotNeeded => {
                if let Some(location) = meta {
                    let mut record = cached.unwrap_or_else(|| BuildMeta::new(&location.identity));
                    record.does_not_have_runnability = true;
                    if let Err(e) = self.meta.write(&location.path, &record) {
                        warn!(path = ?location.path, error = %e, "could not persist build meta");
                    }
                }
                Ok(RunnabilityOutcome::Runnable(code))
            }
            other => {
                if let Some(signal) = output.signal {
                    warn!(?path, signal, "runnability check killed by a signal; treated as runnable");
                } else if !other.is_known() {
                    debug!(code = other.raw(), "unrecognised exit code treated as runnable");
                }
                Ok(RunnabilityOutcome::Runnable(other))
            }
        }
    }
}
