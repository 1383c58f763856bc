// src/checkout/runtime.rs

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::checkout::machine::{CheckoutCommand, CheckoutContext, CheckoutEvent, CheckoutMachine, CheckoutState};
use crate::checkout::solution::validate_project_paths;
use crate::checkout::CheckoutResult;
use crate::errors::{PatchrunError, Result};
use crate::fs::FileSystem;
use crate::git::{Repository, VersionResolver};
use crate::types::VersioningTarget;

/// Drives a [`CheckoutMachine`] against a borrowed repository.
///
/// This is the IO shell around the pure machine: it executes the commands
/// the machine returns and feeds the observed outcome back in. Cancellation
/// is checked before every command and surfaces as
/// `Err(PatchrunError::Cancelled)`, never as a [`CheckoutResult`].
#[derive(Clone)]
pub struct CheckoutRunner {
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for CheckoutRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckoutRunner").finish_non_exhaustive()
    }
}

impl CheckoutRunner {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Check out `target` onto the runner branch and validate that
    /// `project_subpath` is part of the checked-out solution.
    pub async fn checkout(
        &self,
        repo: &Repository,
        target: &VersioningTarget,
        project_subpath: &str,
        cancel: &CancellationToken,
    ) -> Result<CheckoutResult> {
        let mut machine =
            CheckoutMachine::new(CheckoutContext::new(target.clone(), project_subpath));
        self.drive(repo, &mut machine, cancel).await
    }

    /// Run `machine` until it stops.
    ///
    /// An idle machine is started; one parked in `RetryableError` resumes at
    /// the step that failed.
    pub async fn drive(
        &self,
        repo: &Repository,
        machine: &mut CheckoutMachine,
        cancel: &CancellationToken,
    ) -> Result<CheckoutResult> {
        let mut next = if *machine.state() == CheckoutState::Idle {
            machine.step(CheckoutEvent::Started)
        } else if matches!(machine.state(), CheckoutState::RetryableError { .. }) {
            machine.retry()
        } else {
            machine.pending_command()
        };

        while let Some(command) = next {
            if cancel.is_cancelled() {
                machine.step(CheckoutEvent::Cancelled);
                break;
            }
            debug!(?command, "executing checkout command");
            let event = self.execute(repo, command, cancel).await;
            next = machine.step(event);
        }

        match machine.state() {
            CheckoutState::Cancelled => Err(PatchrunError::Cancelled),
            state => machine.result().ok_or_else(|| {
                PatchrunError::Other(anyhow!("checkout stopped in state {}", state.name()))
            }),
        }
    }

    async fn execute(
        &self,
        repo: &Repository,
        command: CheckoutCommand,
        cancel: &CancellationToken,
    ) -> CheckoutEvent {
        let resolver = VersionResolver::new(repo);
        match command {
            CheckoutCommand::ResolveLocal(target) => {
                CheckoutEvent::ResolvedLocally(resolver.resolve_local(&target, cancel).await)
            }
            CheckoutCommand::Fetch(spec) => {
                CheckoutEvent::Fetched(resolver.fetch(&spec, cancel).await)
            }
            CheckoutCommand::ResolveAfterFetch(target) => CheckoutEvent::ResolvedAfterFetch(
                resolver.resolve_after_fetch(&target, cancel).await,
            ),
            CheckoutCommand::ResetRunnerBranch { branch, commit } => {
                match repo.force_checkout_branch(&branch, &commit, cancel).await {
                    Ok(()) => CheckoutEvent::RunnerBranchReset(Ok(())),
                    Err(PatchrunError::Cancelled) => CheckoutEvent::Cancelled,
                    Err(e) => CheckoutEvent::RunnerBranchReset(Err(e.to_string())),
                }
            }
            CheckoutCommand::ValidateProjectPaths { project_subpath } => {
                CheckoutEvent::PathsValidated(validate_project_paths(
                    self.fs.as_ref(),
                    repo.workdir(),
                    &project_subpath,
                ))
            }
        }
    }
}
