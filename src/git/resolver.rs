// src/git/resolver.rs

//! Map a [`VersioningTarget`] to a concrete commit.
//!
//! Resolution is split into phases so the checkout state machine can drive
//! (and retry) the fetch step on its own:
//!
//! 1. [`VersionResolver::resolve_local`] looks at local refs/objects only and
//!    either finds the commit or says what to fetch.
//! 2. [`VersionResolver::fetch`] pulls from the remote.
//! 3. [`VersionResolver::resolve_after_fetch`] looks again, and reports
//!    "unknown reference" if the target is still missing.
//!
//! [`VersionResolver::resolve`] composes the three for callers that don't
//! need the intermediate steps.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::PatchrunError;
use crate::git::repository::{FetchSpec, Repository};
use crate::types::{CommitId, VersioningKind, VersioningTarget};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The commit id is not a legal object id. Halting.
    #[error("Malformed sha string: {0}")]
    Malformed(String),

    /// The reference does not exist locally nor on the remote. Halting.
    #[error("{0}")]
    Unknown(String),

    /// Fetching from the remote failed. Retryable.
    #[error("Failed to fetch from remote '{remote}': {message}")]
    Fetch { remote: String, message: String },

    /// Some other git invocation failed. Retryable.
    #[error("git error: {0}")]
    Git(String),

    #[error("resolution cancelled")]
    Cancelled,
}

impl ResolveError {
    /// Configuration is unusable as given.
    pub fn is_halting(&self) -> bool {
        matches!(self, ResolveError::Malformed(_) | ResolveError::Unknown(_))
    }

    fn from_git(err: PatchrunError) -> Self {
        match err {
            PatchrunError::Cancelled => ResolveError::Cancelled,
            other => ResolveError::Git(other.to_string()),
        }
    }
}

impl From<ResolveError> for PatchrunError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Cancelled => PatchrunError::Cancelled,
            e if e.is_halting() => PatchrunError::Halting(e.to_string()),
            e => PatchrunError::Retryable(e.to_string()),
        }
    }
}

/// Outcome of the local-only lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalResolution {
    Found(CommitId),
    NeedsFetch(FetchSpec),
}

/// A resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub commit: CommitId,
    /// Whether a fetch was needed to find it.
    pub fetched: bool,
}

/// Resolves targets against a borrowed repository.
#[derive(Debug, Clone, Copy)]
pub struct VersionResolver<'r> {
    repo: &'r Repository,
}

impl<'r> VersionResolver<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self { repo }
    }

    /// Full resolution: local lookup, then at most one fetch and a second
    /// lookup.
    pub async fn resolve(
        &self,
        target: &VersioningTarget,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolveError> {
        match self.resolve_local(target, cancel).await? {
            LocalResolution::Found(commit) => Ok(Resolution {
                commit,
                fetched: false,
            }),
            LocalResolution::NeedsFetch(spec) => {
                self.fetch(&spec, cancel).await?;
                let commit = self.resolve_after_fetch(target, cancel).await?;
                Ok(Resolution {
                    commit,
                    fetched: true,
                })
            }
        }
    }

    /// Look the target up without touching the network.
    pub async fn resolve_local(
        &self,
        target: &VersioningTarget,
        cancel: &CancellationToken,
    ) -> Result<LocalResolution, ResolveError> {
        let found = match target.kind() {
            VersioningKind::Commit => {
                let id = parse_commit(target.value())?;
                if self
                    .repo
                    .commit_exists(&id, cancel)
                    .await
                    .map_err(ResolveError::from_git)?
                {
                    Some(id)
                } else {
                    None
                }
            }
            VersioningKind::Tag => self
                .repo
                .tag_target(target.value(), cancel)
                .await
                .map_err(ResolveError::from_git)?,
            VersioningKind::Branch => self
                .repo
                .local_branch_tip(target.value(), cancel)
                .await
                .map_err(ResolveError::from_git)?,
        };

        if let Some(commit) = found {
            debug!(version = %target, commit = %commit.short(10), "resolved locally");
            return Ok(LocalResolution::Found(commit));
        }

        let Some(remote) = self.remote(cancel).await? else {
            return Err(ResolveError::Unknown(format!(
                "{} (no remote configured to fetch from)",
                unknown_message(target)
            )));
        };
        let spec = FetchSpec {
            remote,
            tags: target.kind() != VersioningKind::Branch,
        };
        debug!(version = %target, remote = %spec.remote, tags = spec.tags, "not found locally; fetch required");
        Ok(LocalResolution::NeedsFetch(spec))
    }

    pub async fn fetch(
        &self,
        spec: &FetchSpec,
        cancel: &CancellationToken,
    ) -> Result<(), ResolveError> {
        info!(remote = %spec.remote, tags = spec.tags, "fetching from remote");
        self.repo
            .fetch(spec, cancel)
            .await
            .map_err(|e| match e {
                PatchrunError::Cancelled => ResolveError::Cancelled,
                other => ResolveError::Fetch {
                    remote: spec.remote.clone(),
                    message: other.to_string(),
                },
            })
    }

    /// Second lookup once the remote has been fetched.
    pub async fn resolve_after_fetch(
        &self,
        target: &VersioningTarget,
        cancel: &CancellationToken,
    ) -> Result<CommitId, ResolveError> {
        let found = match target.kind() {
            VersioningKind::Commit => {
                let id = parse_commit(target.value())?;
                if self
                    .repo
                    .commit_exists(&id, cancel)
                    .await
                    .map_err(ResolveError::from_git)?
                {
                    Some(id)
                } else {
                    None
                }
            }
            VersioningKind::Tag => self
                .repo
                .tag_target(target.value(), cancel)
                .await
                .map_err(ResolveError::from_git)?,
            VersioningKind::Branch => {
                let remote = self.remote(cancel).await?.unwrap_or_default();
                let tracking = remote_tracking_name(&remote, target.value());
                self.repo
                    .remote_branch_tip(&tracking, cancel)
                    .await
                    .map_err(ResolveError::from_git)?
            }
        };

        match found {
            Some(commit) => {
                debug!(version = %target, commit = %commit.short(10), "resolved after fetch");
                Ok(commit)
            }
            None => Err(ResolveError::Unknown(unknown_message(target))),
        }
    }

    async fn remote(&self, cancel: &CancellationToken) -> Result<Option<String>, ResolveError> {
        self.repo
            .remote_name(cancel)
            .await
            .map_err(ResolveError::from_git)
    }
}

fn parse_commit(value: &str) -> Result<CommitId, ResolveError> {
    CommitId::parse(value).ok_or_else(|| ResolveError::Malformed(value.to_string()))
}

/// `origin/main` stays as is; `main` becomes `origin/main`.
pub fn remote_tracking_name(remote: &str, branch: &str) -> String {
    if !remote.is_empty() && branch.starts_with(&format!("{remote}/")) {
        branch.to_string()
    } else {
        format!("{remote}/{branch}")
    }
}

fn unknown_message(target: &VersioningTarget) -> String {
    match target.kind() {
        VersioningKind::Commit => {
            format!("Could not locate commit with given sha: {}", target.value())
        }
        VersioningKind::Tag => format!("Could not locate tag: {}", target.value()),
        VersioningKind::Branch => format!("Could not locate branch: {}", target.value()),
    }
}
