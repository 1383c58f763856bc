// src/checkout/machine.rs

//! Pure checkout state machine.
//!
//! [`CheckoutMachine`] consumes [`CheckoutEvent`]s reported by the IO shell
//! and answers with the next [`CheckoutCommand`] to execute, or `None` once a
//! terminal state is reached. It owns no repository handle, no channels and
//! no tokio types, so every path through it can be unit tested directly.
//!
//! ```text
//! Idle -> Resolving -> [Fetching -> ResolvingAfterFetch] -> ResettingRunnerBranch
//!      -> ValidatingProjectPaths -> Done
//! ```
//!
//! Any non-terminal state can fall into `HaltingError`, `RetryableError` or
//! `Cancelled`. A `RetryableError` remembers the state it failed in, so
//! [`CheckoutMachine::retry`] resumes there (a failed fetch retries the fetch
//! only).

use tracing::{debug, info};

use crate::checkout::solution::{PathError, ProjectPaths};
use crate::checkout::transitions;
use crate::checkout::{CheckoutResult, CheckoutSuccess};
use crate::git::{FetchSpec, LocalResolution, ResolveError};
use crate::types::{CommitId, RUNNER_BRANCH, VersioningTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Idle,
    Resolving,
    Fetching {
        spec: FetchSpec,
    },
    ResolvingAfterFetch,
    ResettingRunnerBranch {
        commit: CommitId,
        fetched: bool,
    },
    ValidatingProjectPaths {
        commit: CommitId,
        fetched: bool,
    },
    Done(CheckoutSuccess),
    HaltingError(String),
    RetryableError {
        reason: String,
        /// State to resume from on retry.
        resume: Box<CheckoutState>,
    },
    Cancelled,
}

impl CheckoutState {
    /// No further commands will be issued from this state.
    ///
    /// `RetryableError` counts as terminal for a single drive; it can be
    /// left again through [`CheckoutMachine::retry`].
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutState::Done(_)
                | CheckoutState::HaltingError(_)
                | CheckoutState::RetryableError { .. }
                | CheckoutState::Cancelled
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CheckoutState::Idle => "idle",
            CheckoutState::Resolving => "resolving",
            CheckoutState::Fetching { .. } => "fetching",
            CheckoutState::ResolvingAfterFetch => "resolving-after-fetch",
            CheckoutState::ResettingRunnerBranch { .. } => "resetting-runner-branch",
            CheckoutState::ValidatingProjectPaths { .. } => "validating-project-paths",
            CheckoutState::Done(_) => "done",
            CheckoutState::HaltingError(_) => "halting-error",
            CheckoutState::RetryableError { .. } => "retryable-error",
            CheckoutState::Cancelled => "cancelled",
        }
    }
}

/// What the shell observed while executing the last command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEvent {
    Started,
    ResolvedLocally(Result<LocalResolution, ResolveError>),
    Fetched(Result<(), ResolveError>),
    ResolvedAfterFetch(Result<CommitId, ResolveError>),
    RunnerBranchReset(Result<(), String>),
    PathsValidated(Result<ProjectPaths, PathError>),
    Cancelled,
}

/// Work for the IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutCommand {
    ResolveLocal(VersioningTarget),
    Fetch(FetchSpec),
    ResolveAfterFetch(VersioningTarget),
    ResetRunnerBranch { branch: String, commit: CommitId },
    ValidateProjectPaths { project_subpath: String },
}

/// Fixed inputs of one checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutContext {
    pub target: VersioningTarget,
    pub project_subpath: String,
    pub runner_branch: String,
}

impl CheckoutContext {
    pub fn new(target: VersioningTarget, project_subpath: impl Into<String>) -> Self {
        Self {
            target,
            project_subpath: project_subpath.into(),
            runner_branch: RUNNER_BRANCH.to_string(),
        }
    }

    pub fn with_runner_branch(mut self, branch: impl Into<String>) -> Self {
        self.runner_branch = branch.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutMachine {
    ctx: CheckoutContext,
    state: CheckoutState,
}

impl CheckoutMachine {
    pub fn new(ctx: CheckoutContext) -> Self {
        Self {
            ctx,
            state: CheckoutState::Idle,
        }
    }

    pub fn context(&self) -> &CheckoutContext {
        &self.ctx
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    /// Feed one event and get the next command, if any.
    pub fn step(&mut self, event: CheckoutEvent) -> Option<CheckoutCommand> {
        let next = transitions::next_state(&self.state, event, &self.ctx);
        debug!(from = self.state.name(), to = next.name(), "checkout transition");
        self.state = next;
        self.pending_command()
    }

    /// Command implied by the current state.
    pub fn pending_command(&self) -> Option<CheckoutCommand> {
        match &self.state {
            CheckoutState::Resolving => Some(CheckoutCommand::ResolveLocal(self.ctx.target.clone())),
            CheckoutState::Fetching { spec } => Some(CheckoutCommand::Fetch(spec.clone())),
            CheckoutState::ResolvingAfterFetch => {
                Some(CheckoutCommand::ResolveAfterFetch(self.ctx.target.clone()))
            }
            CheckoutState::ResettingRunnerBranch { commit, .. } => {
                Some(CheckoutCommand::ResetRunnerBranch {
                    branch: self.ctx.runner_branch.clone(),
                    commit: commit.clone(),
                })
            }
            CheckoutState::ValidatingProjectPaths { .. } => {
                Some(CheckoutCommand::ValidateProjectPaths {
                    project_subpath: self.ctx.project_subpath.clone(),
                })
            }
            CheckoutState::Idle
            | CheckoutState::Done(_)
            | CheckoutState::HaltingError(_)
            | CheckoutState::RetryableError { .. }
            | CheckoutState::Cancelled => None,
        }
    }

    /// Leave a `RetryableError` by resuming the step that failed.
    ///
    /// Returns `None` (and changes nothing) in any other state.
    pub fn retry(&mut self) -> Option<CheckoutCommand> {
        let CheckoutState::RetryableError { reason, resume } = &self.state else {
            return None;
        };
        info!(%reason, resume = resume.name(), "retrying checkout step");
        self.state = (**resume).clone();
        self.pending_command()
    }

    /// Final result, once the machine has stopped on a non-cancelled
    /// terminal state.
    pub fn result(&self) -> Option<CheckoutResult> {
        match &self.state {
            CheckoutState::Done(success) => Some(CheckoutResult::success(success.clone())),
            CheckoutState::HaltingError(reason) => Some(CheckoutResult::halting(reason.clone())),
            CheckoutState::RetryableError { reason, .. } => {
                Some(CheckoutResult::retryable(reason.clone()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const SHA: &str = "46c207318c1531de7dc2f8e8c2a91aced183bc30";

    fn commit() -> CommitId {
        CommitId::parse(SHA).unwrap()
    }

    fn origin(tags: bool) -> FetchSpec {
        FetchSpec {
            remote: "origin".into(),
            tags,
        }
    }

    fn paths() -> ProjectPaths {
        ProjectPaths {
            solution_path: PathBuf::from("/repo/Patcher.sln"),
            project_path: PathBuf::from("/repo/Patcher/Patcher.csproj"),
            project_subpath: "Patcher/Patcher.csproj".into(),
        }
    }

    fn machine(target: VersioningTarget) -> CheckoutMachine {
        CheckoutMachine::new(CheckoutContext::new(target, "Patcher/Patcher.csproj"))
    }

    #[test]
    fn local_hit_goes_straight_to_reset_and_validation() {
        let mut m = machine(VersioningTarget::branch("main").unwrap());

        let cmd = m.step(CheckoutEvent::Started);
        assert!(matches!(cmd, Some(CheckoutCommand::ResolveLocal(_))));

        let cmd = m.step(CheckoutEvent::ResolvedLocally(Ok(LocalResolution::Found(commit()))));
        assert_eq!(
            cmd,
            Some(CheckoutCommand::ResetRunnerBranch {
                branch: RUNNER_BRANCH.into(),
                commit: commit()
            })
        );

        let cmd = m.step(CheckoutEvent::RunnerBranchReset(Ok(())));
        assert!(matches!(cmd, Some(CheckoutCommand::ValidateProjectPaths { .. })));

        assert_eq!(m.step(CheckoutEvent::PathsValidated(Ok(paths()))), None);
        let result = m.result().unwrap();
        assert!(result.succeeded());
        let success = result.outcome.unwrap();
        assert_eq!(success.commit, commit());
        assert!(!success.fetched);
        assert_eq!(success.runner_branch, RUNNER_BRANCH);
    }

    #[test]
    fn missing_reference_fetches_once_then_resolves() {
        let mut m = machine(VersioningTarget::tag("1.0").unwrap());
        m.step(CheckoutEvent::Started);

        let cmd = m.step(CheckoutEvent::ResolvedLocally(Ok(LocalResolution::NeedsFetch(
            origin(true),
        ))));
        assert_eq!(cmd, Some(CheckoutCommand::Fetch(origin(true))));

        let cmd = m.step(CheckoutEvent::Fetched(Ok(())));
        assert!(matches!(cmd, Some(CheckoutCommand::ResolveAfterFetch(_))));

        m.step(CheckoutEvent::ResolvedAfterFetch(Ok(commit())));
        m.step(CheckoutEvent::RunnerBranchReset(Ok(())));
        m.step(CheckoutEvent::PathsValidated(Ok(paths())));

        let CheckoutState::Done(success) = m.state() else {
            panic!("expected done, got {:?}", m.state());
        };
        assert!(success.fetched);
    }

    #[test]
    fn malformed_and_unknown_references_halt() {
        let mut m = machine(VersioningTarget::commit("derp").unwrap());
        m.step(CheckoutEvent::Started);
        let cmd = m.step(CheckoutEvent::ResolvedLocally(Err(ResolveError::Malformed(
            "derp".into(),
        ))));
        assert_eq!(cmd, None);
        let result = m.result().unwrap();
        assert!(result.is_halting_error);
        assert!(result.reason().unwrap().contains("Malformed sha string"));

        let mut m = machine(VersioningTarget::commit(SHA).unwrap());
        m.step(CheckoutEvent::Started);
        m.step(CheckoutEvent::ResolvedLocally(Ok(LocalResolution::NeedsFetch(origin(true)))));
        m.step(CheckoutEvent::Fetched(Ok(())));
        m.step(CheckoutEvent::ResolvedAfterFetch(Err(ResolveError::Unknown(
            format!("Could not locate commit with given sha: {SHA}"),
        ))));
        assert!(matches!(m.state(), CheckoutState::HaltingError(_)));
    }

    #[test]
    fn failed_fetch_retries_only_the_fetch() {
        let mut m = machine(VersioningTarget::tag("1.0").unwrap());
        m.step(CheckoutEvent::Started);
        m.step(CheckoutEvent::ResolvedLocally(Ok(LocalResolution::NeedsFetch(origin(true)))));

        let cmd = m.step(CheckoutEvent::Fetched(Err(ResolveError::Fetch {
            remote: "origin".into(),
            message: "network down".into(),
        })));
        assert_eq!(cmd, None);
        let result = m.result().unwrap();
        assert!(!result.is_halting_error);
        assert!(result.reason().unwrap().contains("network down"));

        assert_eq!(m.retry(), Some(CheckoutCommand::Fetch(origin(true))));
        assert!(matches!(m.state(), CheckoutState::Fetching { .. }));
    }

    #[test]
    fn failed_reset_resumes_at_reset() {
        let mut m = machine(VersioningTarget::branch("main").unwrap());
        m.step(CheckoutEvent::Started);
        m.step(CheckoutEvent::ResolvedLocally(Ok(LocalResolution::Found(commit()))));
        m.step(CheckoutEvent::RunnerBranchReset(Err("index.lock exists".into())));
        assert!(matches!(m.state(), CheckoutState::RetryableError { .. }));

        assert!(matches!(
            m.retry(),
            Some(CheckoutCommand::ResetRunnerBranch { .. })
        ));
    }

    #[test]
    fn missing_solution_halts() {
        let mut m = machine(VersioningTarget::branch("main").unwrap());
        m.step(CheckoutEvent::Started);
        m.step(CheckoutEvent::ResolvedLocally(Ok(LocalResolution::Found(commit()))));
        m.step(CheckoutEvent::RunnerBranchReset(Ok(())));
        m.step(CheckoutEvent::PathsValidated(Err(PathError::MissingSolution)));

        let result = m.result().unwrap();
        assert!(result.is_halting_error);
        assert!(result.reason().unwrap().contains("Could not locate solution"));
    }

    #[test]
    fn cancellation_is_not_a_result() {
        let mut m = machine(VersioningTarget::branch("main").unwrap());
        m.step(CheckoutEvent::Started);
        assert_eq!(m.step(CheckoutEvent::Cancelled), None);
        assert_eq!(m.state(), &CheckoutState::Cancelled);
        assert_eq!(m.result(), None);
        assert_eq!(m.retry(), None);
    }

    #[test]
    fn unexpected_event_leaves_state_alone() {
        let mut m = machine(VersioningTarget::branch("main").unwrap());
        m.step(CheckoutEvent::Started);
        let cmd = m.step(CheckoutEvent::Fetched(Ok(())));
        assert_eq!(m.state(), &CheckoutState::Resolving);
        assert!(matches!(cmd, Some(CheckoutCommand::ResolveLocal(_))));
    }
}
