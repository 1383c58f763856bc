// src/git/repository.rs

//! Handle to a local git working copy.
//!
//! All operations shell out to the `git` executable through a
//! [`ProcessRunner`], so they are cancellable and can be scripted in tests.
//! The handle is owned by the caller; checkout code only borrows it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{PatchrunError, Result};
use crate::exec::{ProcessInvocation, ProcessOutput, ProcessRunner};
use crate::types::CommitId;

/// Remote preferred when a working copy has several.
pub const DEFAULT_REMOTE: &str = "origin";

/// What to pull from the remote when a reference is missing locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSpec {
    pub remote: String,
    /// Also fetch all tags.
    pub tags: bool,
}

/// Open working copy plus the runner used to drive `git`.
#[derive(Clone)]
pub struct Repository {
    workdir: PathBuf,
    git: String,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("workdir", &self.workdir)
            .field("git", &self.git)
            .finish_non_exhaustive()
    }
}

impl Repository {
    pub fn open(workdir: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            workdir: workdir.into(),
            git: "git".to_string(),
            runner,
        }
    }

    /// Use a specific `git` executable.
    pub fn with_git_program(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Name of the remote to fetch from: `origin` if present, else the first
    /// configured remote.
    pub async fn remote_name(&self, cancel: &CancellationToken) -> Result<Option<String>> {
        let out = self.run_checked(&["remote"], cancel).await?;
        let remotes: Vec<&str> = out
            .stdout
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        if remotes.contains(&DEFAULT_REMOTE) {
            return Ok(Some(DEFAULT_REMOTE.to_string()));
        }
        Ok(remotes.first().map(|r| r.to_string()))
    }

    /// Resolve a reference to the commit it points at (tags are peeled).
    ///
    /// Returns `None` when the reference does not exist.
    pub async fn rev_parse(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CommitId>> {
        let peeled = format!("{reference}^{{commit}}");
        let out = self
            .run(&["rev-parse", "--verify", "--quiet", &peeled], cancel)
            .await?;
        if !out.success() {
            debug!(reference, "reference not found");
            return Ok(None);
        }
        let id = out.stdout.first().and_then(|l| CommitId::parse(l));
        if id.is_none() {
            warn!(reference, stdout = ?out.stdout, "unexpected rev-parse output");
        }
        Ok(id)
    }

    /// True if the commit object exists locally.
    pub async fn commit_exists(&self, id: &CommitId, cancel: &CancellationToken) -> Result<bool> {
        let object = format!("{id}^{{commit}}");
        let out = self.run(&["cat-file", "-e", &object], cancel).await?;
        Ok(out.success())
    }

    pub async fn local_branch_tip(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CommitId>> {
        self.rev_parse(&format!("refs/heads/{name}"), cancel).await
    }

    pub async fn tag_target(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CommitId>> {
        self.rev_parse(&format!("refs/tags/{name}"), cancel).await
    }

    /// Tip of a remote-tracking branch, e.g. `origin/main`.
    pub async fn remote_branch_tip(
        &self,
        remote_branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CommitId>> {
        self.rev_parse(&format!("refs/remotes/{remote_branch}"), cancel)
            .await
    }

    /// Fetch from a remote.
    ///
    /// A failing fetch (network, auth, unknown remote) is reported as
    /// `PatchrunError::Retryable` carrying git's stderr.
    pub async fn fetch(&self, spec: &FetchSpec, cancel: &CancellationToken) -> Result<()> {
        let mut args = vec!["fetch", "--force"];
        if spec.tags {
            args.push("--tags");
        }
        args.push(&spec.remote);
        debug!(remote = %spec.remote, tags = spec.tags, "fetching");
        self.run_checked(&args, cancel).await?;
        Ok(())
    }

    /// Point `branch` at `commit`, check it out, and discard any local state.
    ///
    /// Always a hard reset, even if the branch already sits on `commit`.
    pub async fn force_checkout_branch(
        &self,
        branch: &str,
        commit: &CommitId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let sha = commit.as_str();
        self.run_checked(&["checkout", "--force", "-B", branch, sha], cancel)
            .await?;
        self.run_checked(&["reset", "--hard", sha], cancel).await?;
        Ok(())
    }

    pub async fn head_commit(&self, cancel: &CancellationToken) -> Result<Option<CommitId>> {
        self.rev_parse("HEAD", cancel).await
    }

    /// Checked-out branch name; `None` on a detached HEAD.
    pub async fn current_branch(&self, cancel: &CancellationToken) -> Result<Option<String>> {
        let out = self
            .run_checked(&["rev-parse", "--abbrev-ref", "HEAD"], cancel)
            .await?;
        let name = out.stdout.first().map(|l| l.trim().to_string());
        Ok(name.filter(|n| n != "HEAD" && !n.is_empty()))
    }

    pub async fn branch_names(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.ref_names("refs/heads", cancel).await
    }

    pub async fn tag_names(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.ref_names("refs/tags", cancel).await
    }

    async fn ref_names(&self, prefix: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let out = self
            .run_checked(
                &["for-each-ref", "--format=%(refname:short)", prefix],
                cancel,
            )
            .await?;
        Ok(out
            .stdout
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn run_checked(&self, args: &[&str], cancel: &CancellationToken) -> Result<ProcessOutput> {
        let out = self.run(args, cancel).await?;
        if !out.success() {
            return Err(PatchrunError::Retryable(format!(
                "git {} failed: {}",
                args.join(" "),
                out.stderr.join("\n").trim()
            )));
        }
        Ok(out)
    }

    async fn run(&self, args: &[&str], cancel: &CancellationToken) -> Result<ProcessOutput> {
        let invocation = ProcessInvocation::new(&self.git, cancel.clone())
            .args(args.iter().copied())
            .working_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0");
        self.runner.run_and_capture(invocation).await
    }
}
