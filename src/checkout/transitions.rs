// src/checkout/transitions.rs

//! Transition functions for the checkout state machine.

use tracing::{info, warn};

use crate::checkout::CheckoutSuccess;
use crate::checkout::machine::{CheckoutContext, CheckoutEvent, CheckoutState};
use crate::checkout::solution::{PathError, ProjectPaths};
use crate::git::{LocalResolution, ResolveError};
use crate::types::CommitId;

/// Compute the state that follows `state` once `event` has been observed.
///
/// Events that do not belong to the current state are logged and ignored.
pub fn next_state(
    state: &CheckoutState,
    event: CheckoutEvent,
    ctx: &CheckoutContext,
) -> CheckoutState {
    match (state, event) {
        (s, CheckoutEvent::Cancelled) if !s.is_terminal() => {
            info!(state = s.name(), "checkout cancelled");
            CheckoutState::Cancelled
        }
        (CheckoutState::Idle, CheckoutEvent::Started) => {
            info!(version = %ctx.target, "resolving patcher version");
            CheckoutState::Resolving
        }
        (CheckoutState::Resolving, CheckoutEvent::ResolvedLocally(result)) => {
            on_resolved_locally(result)
        }
        (CheckoutState::Fetching { spec }, CheckoutEvent::Fetched(result)) => match result {
            Ok(()) => CheckoutState::ResolvingAfterFetch,
            Err(e) => on_resolve_error(
                e,
                CheckoutState::Fetching { spec: spec.clone() },
            ),
        },
        (CheckoutState::ResolvingAfterFetch, CheckoutEvent::ResolvedAfterFetch(result)) => {
            match result {
                Ok(commit) => CheckoutState::ResettingRunnerBranch {
                    commit,
                    fetched: true,
                },
                Err(e) => on_resolve_error(e, CheckoutState::ResolvingAfterFetch),
            }
        }
        (
            CheckoutState::ResettingRunnerBranch { commit, fetched },
            CheckoutEvent::RunnerBranchReset(result),
        ) => match result {
            Ok(()) => CheckoutState::ValidatingProjectPaths {
                commit: commit.clone(),
                fetched: *fetched,
            },
            Err(reason) => CheckoutState::RetryableError {
                reason,
                resume: Box::new(state.clone()),
            },
        },
        (
            CheckoutState::ValidatingProjectPaths { commit, fetched },
            CheckoutEvent::PathsValidated(result),
        ) => on_paths_validated(state, ctx, commit, *fetched, result),
        (s, event) => {
            warn!(state = s.name(), ?event, "ignoring event not expected in this state");
            s.clone()
        }
    }
}

fn on_resolved_locally(result: Result<LocalResolution, ResolveError>) -> CheckoutState {
    match result {
        Ok(LocalResolution::Found(commit)) => CheckoutState::ResettingRunnerBranch {
            commit,
            fetched: false,
        },
        Ok(LocalResolution::NeedsFetch(spec)) => CheckoutState::Fetching { spec },
        Err(e) => on_resolve_error(e, CheckoutState::Resolving),
    }
}

fn on_resolve_error(err: ResolveError, resume: CheckoutState) -> CheckoutState {
    match err {
        ResolveError::Cancelled => CheckoutState::Cancelled,
        e if e.is_halting() => CheckoutState::HaltingError(e.to_string()),
        e => CheckoutState::RetryableError {
            reason: e.to_string(),
            resume: Box::new(resume),
        },
    }
}

fn on_paths_validated(
    state: &CheckoutState,
    ctx: &CheckoutContext,
    commit: &CommitId,
    fetched: bool,
    result: Result<ProjectPaths, PathError>,
) -> CheckoutState {
    match result {
        Ok(paths) => {
            info!(
                commit = %commit.short(10),
                project = %paths.project_subpath,
                "checkout complete"
            );
            CheckoutState::Done(CheckoutSuccess {
                commit: commit.clone(),
                runner_branch: ctx.runner_branch.clone(),
                solution_path: paths.solution_path,
                project_path: paths.project_path,
                project_subpath: paths.project_subpath,
                fetched,
            })
        }
        Err(e) if e.is_halting() => CheckoutState::HaltingError(e.message()),
        Err(e) => CheckoutState::RetryableError {
            reason: e.message(),
            resume: Box::new(state.clone()),
        },
    }
}
