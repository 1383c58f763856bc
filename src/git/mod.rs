// src/git/mod.rs

//! Git plumbing for patcher repositories.
//!
//! - [`repository`] wraps a local working copy ([`Repository`]) and exposes
//!   the handful of git operations the pipeline needs (lookups, fetch, hard
//!   reset of the runner branch, branch/tag enumeration).
//! - [`resolver`] turns a branch/tag/commit target into a commit id, fetching
//!   from the remote only when the reference is missing locally.

pub mod repository;
pub mod resolver;

pub use repository::{FetchSpec, Repository};
pub use resolver::{LocalResolution, Resolution, ResolveError, VersionResolver};
