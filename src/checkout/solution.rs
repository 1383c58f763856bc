// src/checkout/solution.rs

//! Locate the patcher's solution and target project inside a checkout.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::fs::{FileSystem, files_with_extension};

/// `Project("{GUID}") = "Name", "Sub\Name.csproj", "{GUID}"`
static PROJECT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*Project\("[^"]*"\)\s*=\s*"[^"]*"\s*,\s*"([^"]+)""#)
        .expect("project line regex is valid")
});

/// Where the solution and the selected project live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub solution_path: PathBuf,
    /// Absolute path of the project file.
    pub project_path: PathBuf,
    /// Project path relative to the solution, as listed in it.
    pub project_subpath: String,
}

/// Why path validation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    MissingSolution,
    MissingProject(String),
    /// The solution could not be read.
    Io(String),
}

impl PathError {
    pub fn is_halting(&self) -> bool {
        !matches!(self, PathError::Io(_))
    }

    pub fn message(&self) -> String {
        match self {
            PathError::MissingSolution => "Could not locate solution to run.".to_string(),
            PathError::MissingProject(proj) => {
                format!("Could not locate target project file: {proj}.")
            }
            PathError::Io(e) => format!("Could not read solution: {e}"),
        }
    }
}

/// Project files listed in a solution, with `/` separators.
///
/// Lines that are not project entries are skipped, as are solution folders
/// (entries whose path is not a `*proj` file).
pub fn available_projects(solution_contents: &str) -> Vec<String> {
    solution_contents
        .lines()
        .filter_map(|line| PROJECT_LINE.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace('\\', "/"))
        .filter(|path| {
            Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.to_ascii_lowercase().ends_with("proj"))
        })
        .collect()
}

/// First `*.sln` (by name) directly in `repo_root`.
pub fn locate_solution(fs: &dyn FileSystem, repo_root: &Path) -> Option<PathBuf> {
    match files_with_extension(fs, repo_root, "sln") {
        Ok(found) => found.into_iter().next(),
        Err(e) => {
            debug!(?repo_root, error = %e, "could not list repository root");
            None
        }
    }
}

/// Confirm the solution exists and lists a project with the same file name as
/// `project_subpath`.
pub fn validate_project_paths(
    fs: &dyn FileSystem,
    repo_root: &Path,
    project_subpath: &str,
) -> Result<ProjectPaths, PathError> {
    let solution_path = locate_solution(fs, repo_root).ok_or(PathError::MissingSolution)?;

    let contents = fs
        .read_to_string(&solution_path)
        .map_err(|e| PathError::Io(e.to_string()))?;

    let normalised = project_subpath.replace('\\', "/");
    let wanted = Path::new(&normalised)
        .file_name()
        .ok_or_else(|| PathError::MissingProject(project_subpath.to_string()))?;

    let listed = available_projects(&contents)
        .into_iter()
        .find(|p| Path::new(p).file_name() == Some(wanted))
        .ok_or_else(|| PathError::MissingProject(project_subpath.to_string()))?;

    debug!(solution = ?solution_path, project = %listed, "located target project");
    Ok(ProjectPaths {
        project_path: repo_root.join(&listed),
        project_subpath: listed,
        solution_path,
    })
}
