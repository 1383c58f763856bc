// src/patcher/pipeline.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkout::{CheckoutRunner, CheckoutSuccess};
use crate::config::{PatcherConfig, RunnerSection};
use crate::engine::{ScopedQueues, WorkQueue};
use crate::errors::{PatchrunError, Result};
use crate::exec::{CaptureOptions, ProcessRunner};
use crate::fs::FileSystem;
use crate::git::Repository;
use crate::patcher::build::Builder;
use crate::protocol::{
    BuildIdentity, BuildMeta, BuildMetaStore, DelimitedSettingsParser, ExitCode, LibraryPackages,
    LibraryVersions, MAX_CAPTURED_LINES, MetaLocation, PackageListing, RunPatcherQuery, RunnabilityChecker,
    RunnabilityOutcome, RunnabilityQuery, SettingsLineParser, SettingsStyleQuery,
    SettingsStyleResult, StartInfoProvider,
};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub commit: String,
    pub output_path: PathBuf,
    pub runnability: RunnabilityOutcome,
}

/// Everything needed to prepare and run one patcher.
///
/// Checkout, build and launches all go through the patcher's own
/// [`WorkQueue`] scope (its name), so at most one of them touches the working
/// copy at a time.
pub struct PatcherPipeline {
    patcher: PatcherConfig,
    runner_cfg: RunnerSection,
    process: Arc<dyn ProcessRunner>,
    repo: Repository,
    queue: Arc<WorkQueue>,
    checkout: CheckoutRunner,
    builder: Builder,
    runnability: RunnabilityChecker,
    settings: SettingsStyleQuery,
    listing: PackageListing,
    meta: BuildMetaStore,
    start: StartInfoProvider,
}

impl fmt::Debug for PatcherPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatcherPipeline")
            .field("patcher", &self.patcher.name)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl PatcherPipeline {
    pub fn new(
        patcher: PatcherConfig,
        runner_cfg: RunnerSection,
        process: Arc<dyn ProcessRunner>,
        fs: Arc<dyn FileSystem>,
        queues: &ScopedQueues,
    ) -> Self {
        Self::with_parser(
            patcher,
            runner_cfg,
            process,
            fs,
            queues,
            Arc::new(DelimitedSettingsParser),
        )
    }

    pub fn with_parser(
        patcher: PatcherConfig,
        runner_cfg: RunnerSection,
        process: Arc<dyn ProcessRunner>,
        fs: Arc<dyn FileSystem>,
        queues: &ScopedQueues,
        parser: Arc<dyn SettingsLineParser>,
    ) -> Self {
        let queue = queues.get(&patcher.name);
        let repo = Repository::open(&patcher.repo, Arc::clone(&process))
            .with_git_program(&runner_cfg.git);
        let start = StartInfoProvider::new(&runner_cfg.dotnet);
        let meta = BuildMetaStore::new(Arc::clone(&fs));
        let builder = Builder::new(Arc::clone(&process), Arc::clone(&queue), &runner_cfg.dotnet);
        let runnability = RunnabilityChecker::new(
            Arc::clone(&process),
            Arc::clone(&queue),
            start.clone(),
            meta.clone(),
        )
        .with_short_circuit(runner_cfg.short_circuit)
        .with_max_lines(runner_cfg.max_captured_lines);
        let settings = SettingsStyleQuery::new(
            Arc::clone(&process),
            Arc::clone(&queue),
            start.clone(),
            parser,
            Arc::new(builder.clone()),
        );
        let listing = PackageListing::new(Arc::clone(&process), Arc::clone(&queue), &runner_cfg.dotnet);

        Self {
            checkout: CheckoutRunner::new(fs),
            patcher,
            runner_cfg,
            process,
            repo,
            queue,
            builder,
            runnability,
            settings,
            listing,
            meta,
            start,
        }
    }

    pub fn name(&self) -> &str {
        &self.patcher.name
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Pin the working copy to the configured version.
    ///
    /// Halting and retryable failures come back as
    /// `PatchrunError::Halting` / `PatchrunError::Retryable`.
    pub async fn checkout(&self, cancel: &CancellationToken) -> Result<CheckoutSuccess> {
        let checkout = self.checkout.clone();
        let repo = self.repo.clone();
        let target = self.patcher.versioning.clone();
        let project = self.patcher.project.clone();

        let success = self
            .queue
            .enqueue(cancel, move |token| async move {
                checkout
                    .checkout(&repo, &target, &project, &token)
                    .await?
                    .into_result()
            })
            .await?;
        info!(
            patcher = %self.patcher.name,
            commit = %success.commit,
            project = ?success.project_path,
            "checked out"
        );
        Ok(success)
    }

    /// Build the checked-out project.
    ///
    /// A build meta left by another commit or project is replaced with a
    /// fresh record; one for this exact build is kept.
    pub async fn build(&self, checkout: &CheckoutSuccess, cancel: &CancellationToken) -> Result<()> {
        self.builder
            .run(&checkout.project_path, cancel)
            .await?
            .into_result()?;

        if let Some(location) = self.meta_location(checkout)
            && self.meta.read_for(&location).is_none()
        {
            let fresh = BuildMeta::new(&location.identity);
            if let Err(e) = self.meta.write(&location.path, &fresh) {
                warn!(patcher = %self.patcher.name, error = %e, "could not reset build meta");
            }
        }
        Ok(())
    }

    /// Checkout followed by build.
    pub async fn prepare(&self, cancel: &CancellationToken) -> Result<CheckoutSuccess> {
        let checkout = self.checkout(cancel).await?;
        self.build(&checkout, cancel).await?;
        Ok(checkout)
    }

    pub async fn check_runnability(
        &self,
        load_order: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunnabilityOutcome> {
        let checkout = self.prepare(cancel).await?;
        self.check_prepared(&checkout, load_order, cancel).await
    }

    async fn check_prepared(
        &self,
        checkout: &CheckoutSuccess,
        load_order: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunnabilityOutcome> {
        let query = RunnabilityQuery {
            data_folder: self.runner_cfg.data_folder.clone(),
            game_release: self.runner_cfg.game_release.clone(),
            load_order_file: load_order.to_path_buf(),
            extra_data_folder: self.runner_cfg.extra_data_folder.clone(),
        };
        let location = self.meta_location(checkout);
        self.runnability
            .check(&checkout.project_path, false, &query, location.as_ref(), cancel)
            .await
    }

    pub async fn settings_style(
        &self,
        build: bool,
        cancel: &CancellationToken,
    ) -> Result<SettingsStyleResult> {
        let checkout = self.checkout(cancel).await?;
        self.settings
            .get(&checkout.project_path, false, build, cancel)
            .await
    }

    /// Checkout, build, check runnability and run the patcher.
    pub async fn run(
        &self,
        load_order: &Path,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let checkout = self.prepare(cancel).await?;
        let runnability = self.check_prepared(&checkout, load_order, cancel).await?;
        runnability.clone().into_result()?;

        let query = RunPatcherQuery {
            data_folder: self.runner_cfg.data_folder.clone(),
            game_release: self.runner_cfg.game_release.clone(),
            load_order_file: load_order.to_path_buf(),
            extra_data_folder: self.runner_cfg.extra_data_folder.clone(),
            output_path: output_path.to_path_buf(),
            patcher_name: self.patcher.name.clone(),
        };
        let invocation =
            self.start
                .start(&checkout.project_path, false, &query, false, cancel.clone());
        let process = Arc::clone(&self.process);
        let capture = CaptureOptions::limited(
            self.runner_cfg
                .max_captured_lines
                .clamp(1, MAX_CAPTURED_LINES),
        );
        info!(patcher = %self.patcher.name, %invocation, "running patcher");

        let output = self
            .queue
            .enqueue(cancel, move |token| async move {
                let mut invocation = invocation;
                invocation.cancel = token;
                process.run(invocation, capture).await
            })
            .await?;

        match ExitCode::from_raw(output.exit_code) {
            ExitCode::Success => {
                info!(patcher = %self.patcher.name, output = ?output_path, "patcher finished");
                Ok(RunReport {
                    commit: checkout.commit.to_string(),
                    output_path: output_path.to_path_buf(),
                    runnability,
                })
            }
            code => {
                let lines = if output.stderr.is_empty() {
                    output.stdout
                } else {
                    output.stderr
                };
                Err(PatchrunError::PatcherFailed {
                    code: output.exit_code,
                    message: format!("{code}\n{}", lines.join("\n")),
                })
            }
        }
    }

    /// Library and framework versions the patcher uses (`current`) or could
    /// upgrade to.
    pub async fn versions(
        &self,
        packages: &LibraryPackages,
        current: bool,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<LibraryVersions> {
        let checkout = self.checkout(cancel).await?;
        let versions = self
            .listing
            .query_library_versions(
                &checkout.project_path,
                packages,
                current,
                include_prerelease,
                cancel,
            )
            .await?;

        if current && let Some(location) = self.meta_location(&checkout) {
            let mut record = self
                .meta
                .read_for(&location)
                .unwrap_or_else(|| BuildMeta::new(&location.identity));
            record.library_version = versions.library.clone();
            record.framework_version = versions.framework.clone();
            if let Err(e) = self.meta.write(&location.path, &record) {
                warn!(patcher = %self.patcher.name, error = %e, "could not record versions");
            }
        }
        Ok(versions)
    }

    fn meta_location(&self, checkout: &CheckoutSuccess) -> Option<MetaLocation> {
        self.patcher.build_meta.as_ref().map(|path| MetaLocation {
            path: path.clone(),
            identity: BuildIdentity::new(checkout.commit.as_str(), &checkout.project_subpath),
        })
    }
}
