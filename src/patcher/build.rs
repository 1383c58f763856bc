// src/patcher/build.rs

//! Building a patcher project with `dotnet build`.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::WorkQueue;
use crate::errors::{PatchrunError, Result};
use crate::exec::{CaptureOptions, ProcessInvocation, ProcessRunner};

/// Lines of build output quoted in a failure reason.
const REASON_LINES: usize = 10;

/// Marker MSBuild puts on error diagnostics.
const ERROR_MARKER: &str = ": error ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed { exit_code: i32, reason: String },
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            BuildOutcome::Succeeded => Ok(()),
            BuildOutcome::Failed { reason, .. } => Err(PatchrunError::Build(reason)),
        }
    }
}

pub type BuildFuture<'a> = Pin<Box<dyn Future<Output = Result<BuildOutcome>> + Send + 'a>>;

/// Something that can build a project.
pub trait BuildStep: Send + Sync {
    fn build<'a>(&'a self, project_path: &'a Path, cancel: &'a CancellationToken)
    -> BuildFuture<'a>;
}

/// Pick the lines that explain a failed build.
///
/// Error diagnostics first (deduplicated, MSBuild repeats them in the
/// summary); without any, the tail of the output.
pub fn failure_reason(lines: &[String]) -> String {
    let mut errors: Vec<&str> = Vec::new();
    for line in lines.iter().map(|l| l.trim()) {
        if line.contains(ERROR_MARKER) && !errors.contains(&line) {
            errors.push(line);
            if errors.len() == REASON_LINES {
                break;
            }
        }
    }
    if !errors.is_empty() {
        return errors.join("\n");
    }

    let tail = lines.len().saturating_sub(REASON_LINES);
    lines[tail..]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs `dotnet build` through a patcher's work queue.
#[derive(Clone)]
pub struct Builder {
    runner: Arc<dyn ProcessRunner>,
    queue: Arc<WorkQueue>,
    dotnet: String,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("queue", &self.queue)
            .field("dotnet", &self.dotnet)
            .finish_non_exhaustive()
    }
}

impl Builder {
    pub fn new(runner: Arc<dyn ProcessRunner>, queue: Arc<WorkQueue>, dotnet: impl Into<String>) -> Self {
        Self {
            runner,
            queue,
            dotnet: dotnet.into(),
        }
    }

    pub async fn run(&self, project_path: &Path, cancel: &CancellationToken) -> Result<BuildOutcome> {
        let invocation = ProcessInvocation::new(&self.dotnet, cancel.clone())
            .arg("build")
            .arg(project_path.display().to_string());
        let invocation = match project_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => invocation.working_dir(dir),
            None => invocation,
        };
        info!(project = ?project_path, "building patcher");

        let runner = Arc::clone(&self.runner);
        let output = self
            .queue
            .enqueue(cancel, move |token| async move {
                let mut invocation = invocation;
                invocation.cancel = token;
                runner.run(invocation, CaptureOptions::unbounded()).await
            })
            .await?;

        if output.success() {
            info!(project = ?project_path, "build succeeded");
            return Ok(BuildOutcome::Succeeded);
        }

        let mut lines = output.stdout;
        lines.extend(output.stderr);
        let reason = failure_reason(&lines);
        warn!(project = ?project_path, exit_code = output.exit_code, %reason, "build failed");
        Ok(BuildOutcome::Failed {
            exit_code: output.exit_code,
            reason,
        })
    }
}

impl BuildStep for Builder {
    fn build<'a>(
        &'a self,
        project_path: &'a Path,
        cancel: &'a CancellationToken,
    ) -> BuildFuture<'a> {
        Box::pin(self.run(project_path, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lines_are_preferred_and_deduplicated() {
        let lines: Vec<String> = [
            "  Determining projects to restore...",
            "/repo/Patcher/Program.cs(10,5): error CS1002: ; expected [/repo/Patcher/Patcher.csproj]",
            "Build FAILED.",
            "/repo/Patcher/Program.cs(10,5): error CS1002: ; expected [/repo/Patcher/Patcher.csproj]",
            "    1 Error(s)",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let reason = failure_reason(&lines);
        assert_eq!(reason.lines().count(), 1);
        assert!(reason.contains("error CS1002"));
    }

    #[test]
    fn falls_back_to_the_tail() {
        let lines: Vec<String> = (0..30).map(|i| format!("line {i}")).collect();
        let reason = failure_reason(&lines);
        assert!(reason.starts_with("line 20"));
        assert!(reason.ends_with("line 29"));
    }

    #[test]
    fn failed_outcome_is_a_build_error() {
        let outcome = BuildOutcome::Failed {
            exit_code: 1,
            reason: "nope".into(),
        };
        assert!(!outcome.succeeded());
        assert!(matches!(outcome.into_result(), Err(PatchrunError::Build(r)) if r == "nope"));
    }
}
