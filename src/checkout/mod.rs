// src/checkout/mod.rs

//! Checkout of a patcher repository onto the runner branch.
//!
//! Split in the same way as the rest of the crate:
//!
//! - [`machine`] is a synchronous state machine that consumes
//!   [`CheckoutEvent`]s and tells the shell what to do next via
//!   [`CheckoutCommand`]s. No IO, no tokio.
//! - [`transitions`] holds the per-state transition functions.
//! - [`runtime`] is the async shell that executes commands against a
//!   [`Repository`](crate::git::Repository) and a
//!   [`FileSystem`](crate::fs::FileSystem).
//! - [`solution`] finds the solution and target project in the checked-out
//!   tree.

use std::path::PathBuf;

use crate::errors::{PatchrunError, Result};
use crate::types::CommitId;

pub mod machine;
pub mod runtime;
pub mod solution;
pub mod transitions;

pub use machine::{CheckoutCommand, CheckoutContext, CheckoutEvent, CheckoutMachine, CheckoutState};
pub use runtime::CheckoutRunner;
pub use solution::{PathError, ProjectPaths};

/// Everything known about a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSuccess {
    pub commit: CommitId,
    pub runner_branch: String,
    pub solution_path: PathBuf,
    pub project_path: PathBuf,
    /// Project path as listed in the solution.
    pub project_subpath: String,
    /// Whether the remote had to be fetched.
    pub fetched: bool,
}

/// Result of one checkout.
///
/// A halting failure means the configuration has to change before another
/// attempt can succeed; anything else is safe to retry as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutResult {
    pub is_halting_error: bool,
    pub outcome: std::result::Result<CheckoutSuccess, String>,
}

impl CheckoutResult {
    pub fn success(success: CheckoutSuccess) -> Self {
        Self {
            is_halting_error: false,
            outcome: Ok(success),
        }
    }

    pub fn halting(reason: impl Into<String>) -> Self {
        Self {
            is_halting_error: true,
            outcome: Err(reason.into()),
        }
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            is_halting_error: false,
            outcome: Err(reason.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Failure reason, if any.
    pub fn reason(&self) -> Option<&str> {
        self.outcome.as_ref().err().map(String::as_str)
    }

    /// Fold into the crate error taxonomy.
    pub fn into_result(self) -> Result<CheckoutSuccess> {
        match self.outcome {
            Ok(success) => Ok(success),
            Err(reason) if self.is_halting_error => Err(PatchrunError::Halting(reason)),
            Err(reason) => Err(PatchrunError::Retryable(reason)),
        }
    }
}
