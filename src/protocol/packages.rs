// src/protocol/packages.rs

//! Package listing (`dotnet list package`) and library version lookup.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::WorkQueue;
use crate::errors::{PatchrunError, Result};
use crate::exec::{ProcessInvocation, ProcessOutput, ProcessRunner};

/// Marker line after which the listing starts.
pub const LISTING_HEADER: &str = "Top-level Package";

/// One row of a package listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageListingEntry {
    pub package: String,
    pub requested: String,
    pub resolved: String,
    pub latest: String,
}

/// Parse `> <package> <requested> <resolved> [<latest>]`.
///
/// A missing `latest` column means the resolved version is the latest one.
pub fn parse_listing_line(line: &str) -> Option<PackageListingEntry> {
    let rest = line.trim().strip_prefix('>')?;
    let mut cols = rest.split_whitespace();
    let package = cols.next()?;
    let requested = cols.next()?;
    let resolved = cols.next()?;
    let latest = cols.next().unwrap_or(resolved);
    Some(PackageListingEntry {
        package: package.to_string(),
        requested: requested.to_string(),
        resolved: resolved.to_string(),
        latest: latest.to_string(),
    })
}

/// Entries from the lines that follow [`LISTING_HEADER`].
///
/// Lines before the header and unparseable lines are skipped.
pub fn parse_listing<S: AsRef<str>>(lines: &[S]) -> Vec<PackageListingEntry> {
    lines
        .iter()
        .map(AsRef::<str>::as_ref)
        .skip_while(|line| !line.contains(LISTING_HEADER))
        .skip(1)
        .filter_map(parse_listing_line)
        .collect()
}

/// Package names that identify the patcher libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPackages {
    /// Packages starting with this prefix carry the library version...
    pub library_prefix: String,
    /// ...except this one, which carries the framework version.
    pub framework_package: String,
}

impl Default for LibraryPackages {
    fn default() -> Self {
        Self {
            library_prefix: "Mutagen.Bethesda".to_string(),
            framework_package: "Mutagen.Bethesda.Synthesis".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryVersions {
    pub library: Option<String>,
    pub framework: Option<String>,
}

/// Pick the library and framework versions from a listing.
///
/// `current` selects resolved versions, otherwise the latest available ones.
/// When several library packages are listed the last one wins.
pub fn pick_library_versions(
    entries: &[PackageListingEntry],
    packages: &LibraryPackages,
    current: bool,
) -> LibraryVersions {
    let mut versions = LibraryVersions::default();
    for entry in entries {
        let version = if current { &entry.resolved } else { &entry.latest };
        if entry.package == packages.framework_package {
            versions.framework = Some(version.clone());
        } else if entry.package.starts_with(&packages.library_prefix) {
            versions.library = Some(version.clone());
        }
    }
    versions
}

async fn restore_then_list(
    runner: Arc<dyn ProcessRunner>,
    mut restore: ProcessInvocation,
    mut list: ProcessInvocation,
    token: CancellationToken,
) -> Result<ProcessOutput> {
    restore.cancel = token.clone();
    let restored = runner.run_and_capture(restore).await?;
    if !restored.success() {
        let mut lines = restored.stderr;
        if lines.is_empty() {
            lines = restored.stdout;
        }
        return Err(PatchrunError::PackageListing(format!(
            "restore exited with {}\n{}",
            restored.exit_code,
            lines.join("\n")
        )));
    }

    list.cancel = token;
    debug!(%list, "listing packages");
    let output = runner.run_and_capture(list).await?;
    if !output.stderr.is_empty() {
        return Err(PatchrunError::PackageListing(output.stderr.join("\n")));
    }
    Ok(output)
}

/// Runs restore + listing for a project.
///
/// Both launches form a single item on the patcher's [`WorkQueue`], so a
/// restore never overlaps a build of the same project.
#[derive(Clone)]
pub struct PackageListing {
    runner: Arc<dyn ProcessRunner>,
    queue: Arc<WorkQueue>,
    dotnet: String,
}

impl fmt::Debug for PackageListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageListing")
            .field("queue", &self.queue)
            .field("dotnet", &self.dotnet)
            .finish_non_exhaustive()
    }
}

impl PackageListing {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        queue: Arc<WorkQueue>,
        dotnet: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            queue,
            dotnet: dotnet.into(),
        }
    }

    /// Restore, then list packages of `project_path`.
    ///
    /// A failing restore aborts the query. Any stderr output from the listing
    /// fails the whole query with all stderr lines in the message.
    pub async fn query(
        &self,
        project_path: &Path,
        outdated: bool,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageListingEntry>> {
        let project = project_path.display().to_string();

        let restore = ProcessInvocation::new(&self.dotnet, cancel.clone())
            .arg("restore")
            .arg(&project);
        let mut list = ProcessInvocation::new(&self.dotnet, cancel.clone())
            .arg("list")
            .arg(&project)
            .arg("package");
        if outdated {
            list = list.arg("--outdated");
        }
        if include_prerelease {
            list = list.arg("--include-prerelease");
        }

        let runner = Arc::clone(&self.runner);
        let output = self
            .queue
            .enqueue(cancel, move |token| restore_then_list(runner, restore, list, token))
            .await?;

        let entries = parse_listing(&output.stdout);
        info!(project = %project, entries = entries.len(), "package listing");
        Ok(entries)
    }

    /// Library and framework versions used by (or available to) a project.
    pub async fn query_library_versions(
        &self,
        project_path: &Path,
        packages: &LibraryPackages,
        current: bool,
        include_prerelease: bool,
        cancel: &CancellationToken,
    ) -> Result<LibraryVersions> {
        let entries = self
            .query(project_path, !current, include_prerelease, cancel)
            .await?;
        Ok(pick_library_versions(&entries, packages, current))
    }
}
