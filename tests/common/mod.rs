#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use patchrun::checkout::CheckoutRunner;
use patchrun::exec::{ProcessRunner, RealProcessRunner};
use patchrun::fs::RealFileSystem;
use patchrun::git::Repository;

pub use patchrun_test_utils::builders;
pub use patchrun_test_utils::git_fixture::{DEFAULT_BRANCH, PROJECT_SUBPATH};
pub use patchrun_test_utils::{
    FakeProcessRunner, FakeResponse, GitFixture, init_tracing, with_timeout,
};

/// Repository handle for a fixture working copy, driven by the real `git`.
pub fn real_repo(path: &Path) -> Repository {
    let runner: Arc<dyn ProcessRunner> = Arc::new(RealProcessRunner::new());
    Repository::open(path, runner)
}

pub fn real_checkout() -> CheckoutRunner {
    CheckoutRunner::new(Arc::new(RealFileSystem))
}
