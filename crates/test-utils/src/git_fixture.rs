use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Branch every fixture repository starts on.
pub const DEFAULT_BRANCH: &str = "main";

/// Project path as listed in the fixture solution.
pub const PROJECT_SUBPATH: &str = "Patcher/Patcher.csproj";

const SOLUTION: &str = r#"
Microsoft Visual Studio Solution File, Format Version 12.00
Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "Patcher", "Patcher\Patcher.csproj", "{5A1F3C9E-8D42-4B7A-9E0C-2F6D1B3A7C55}"
EndProject
"#;

const PROJECT: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
  </PropertyGroup>
</Project>
"#;

/// A bare "remote", an upstream working copy that pushes to it, and a local
/// clone that plays the patcher's working copy.
///
/// All three live in one temp dir that is removed on drop. Uses the real
/// `git` executable.
pub struct GitFixture {
    _dir: TempDir,
    pub remote: PathBuf,
    pub upstream: PathBuf,
    pub local: PathBuf,
    /// Tip of the default branch after setup.
    pub initial_commit: String,
}

impl GitFixture {
    /// Remote with one commit holding a solution and its project.
    pub fn new() -> Self {
        Self::with_files(&[("Solution.sln", SOLUTION), (PROJECT_SUBPATH, PROJECT)])
    }

    /// Remote whose first commit contains exactly `files`.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let remote = dir.path().join("remote.git");
        let upstream = dir.path().join("upstream");
        let local = dir.path().join("local");

        git(dir.path(), &["init", "--bare", "-b", DEFAULT_BRANCH, "remote.git"]);
        git(dir.path(), &["init", "-b", DEFAULT_BRANCH, "upstream"]);
        git(&upstream, &["remote", "add", "origin", path_str(&remote)]);

        for (rel, content) in files {
            write_file(&upstream, rel, content);
        }
        if files.is_empty() {
            write_file(&upstream, "README.md", "empty\n");
        }
        git(&upstream, &["add", "-A"]);
        git(&upstream, &["commit", "-m", "Initial"]);
        git(&upstream, &["push", "-u", "origin", DEFAULT_BRANCH]);
        let initial_commit = rev_parse(&upstream, "HEAD");

        git(
            dir.path(),
            &["clone", "-b", DEFAULT_BRANCH, path_str(&remote), "local"],
        );

        Self {
            _dir: dir,
            remote,
            upstream,
            local,
            initial_commit,
        }
    }

    /// Write `rel` in `repo`, commit it and return the new commit id.
    pub fn commit_file(&self, repo: &Path, rel: &str, content: &str) -> String {
        write_file(repo, rel, content);
        git(repo, &["add", "-A"]);
        git(repo, &["commit", "-m", &format!("Update {rel}")]);
        rev_parse(repo, "HEAD")
    }

    pub fn tag(&self, repo: &Path, name: &str, commit: &str) {
        git(repo, &["tag", name, commit]);
    }

    pub fn push(&self, repo: &Path, refspec: &str) {
        git(repo, &["push", "--force", "origin", refspec]);
    }

    pub fn create_branch(&self, repo: &Path, name: &str, commit: &str) {
        git(repo, &["branch", "--force", name, commit]);
    }

    pub fn delete_branch(&self, repo: &Path, name: &str) {
        git(repo, &["branch", "-D", name]);
    }

    pub fn head(&self, repo: &Path) -> String {
        rev_parse(repo, "HEAD")
    }

    pub fn current_branch(&self, repo: &Path) -> String {
        git(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Tip of a local branch, `None` if it doesn't exist.
    pub fn branch_tip(&self, repo: &Path, name: &str) -> Option<String> {
        let out = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("refs/heads/{name}"))
            .current_dir(repo)
            .output()
            .expect("run git");
        out.status
            .success()
            .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    pub fn branches(&self, repo: &Path) -> Vec<String> {
        git(repo, &["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Default for GitFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn write_file(repo: &Path, rel: &str, content: &str) {
    let path = repo.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, content).expect("write fixture file");
}

fn rev_parse(repo: &Path, reference: &str) -> String {
    git(repo, &["rev-parse", reference])
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

/// Run git in `dir`, panicking on failure. Returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Patchrun Tests")
        .env("GIT_AUTHOR_EMAIL", "tests@patchrun.invalid")
        .env("GIT_COMMITTER_NAME", "Patchrun Tests")
        .env("GIT_COMMITTER_EMAIL", "tests@patchrun.invalid")
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("run git");
    assert!(
        out.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}
