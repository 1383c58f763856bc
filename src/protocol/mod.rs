// src/protocol/mod.rs

//! The exit-code protocol spoken with patcher processes.
//!
//! A patcher answers a query through its exit code, plus stdout lines when
//! the code says there is something to read.
//!
//! - [`codes`]: the closed set of exit codes.
//! - [`query`]: query verbs/arguments and how a patcher is launched.
//! - [`runnability`]: the runnability check, with build-meta short-circuit.
//! - [`settings`]: settings-style discovery.
//! - [`packages`]: package listing and library version lookup.
//! - [`meta`]: the build meta cache.

pub mod codes;
pub mod meta;
pub mod packages;
pub mod query;
pub mod runnability;
pub mod settings;

pub use codes::ExitCode;
pub use meta::{BuildIdentity, BuildMeta, BuildMetaStore, MetaLocation};
pub use packages::{LibraryPackages, LibraryVersions, PackageListing, PackageListingEntry};
pub use query::{PatcherQuery, RunPatcherQuery, RunnabilityQuery, SettingsQuery, StartInfoProvider};
pub use runnability::{MAX_CAPTURED_LINES, RunnabilityChecker, RunnabilityOutcome};
pub use settings::{
    DelimitedSettingsParser, SettingsLineParser, SettingsStyle, SettingsStyleQuery,
    SettingsStyleResult, SettingsTarget,
};
