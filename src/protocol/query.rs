// src/protocol/query.rs

//! Query argument encoding and launch construction.
//!
//! A query is passed to the patcher as a verb followed by `--Name value`
//! options. [`StartInfoProvider`] decides whether the patcher is launched as a
//! prebuilt executable or through `dotnet run`.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::exec::ProcessInvocation;
use crate::types::GameRelease;

/// A request a patcher answers through its exit code.
pub trait PatcherQuery {
    fn verb(&self) -> &'static str;
    fn to_args(&self) -> Vec<String>;
}

fn push_opt(args: &mut Vec<String>, name: &str, value: impl Into<String>) {
    args.push(format!("--{name}"));
    args.push(value.into());
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Can the patcher run against this environment?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnabilityQuery {
    pub data_folder: PathBuf,
    pub game_release: GameRelease,
    pub load_order_file: PathBuf,
    pub extra_data_folder: Option<PathBuf>,
}

impl PatcherQuery for RunnabilityQuery {
    fn verb(&self) -> &'static str {
        "CheckRunnability"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        push_opt(&mut args, "DataFolderPath", path_arg(&self.data_folder));
        push_opt(&mut args, "GameRelease", self.game_release.as_str());
        push_opt(&mut args, "LoadOrderFilePath", path_arg(&self.load_order_file));
        if let Some(extra) = &self.extra_data_folder {
            push_opt(&mut args, "ExtraDataFolder", path_arg(extra));
        }
        args
    }
}

/// How does the patcher expose its settings?
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsQuery;

impl PatcherQuery for SettingsQuery {
    fn verb(&self) -> &'static str {
        "SettingsQuery"
    }

    fn to_args(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Run the patcher and write its output plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPatcherQuery {
    pub data_folder: PathBuf,
    pub game_release: GameRelease,
    pub load_order_file: PathBuf,
    pub extra_data_folder: Option<PathBuf>,
    pub output_path: PathBuf,
    pub patcher_name: String,
}

impl PatcherQuery for RunPatcherQuery {
    fn verb(&self) -> &'static str {
        "RunPatcher"
    }

    fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        push_opt(&mut args, "DataFolderPath", path_arg(&self.data_folder));
        push_opt(&mut args, "GameRelease", self.game_release.as_str());
        push_opt(&mut args, "LoadOrderFilePath", path_arg(&self.load_order_file));
        push_opt(&mut args, "OutputPath", path_arg(&self.output_path));
        push_opt(&mut args, "PatcherName", self.patcher_name.as_str());
        if let Some(extra) = &self.extra_data_folder {
            push_opt(&mut args, "ExtraDataFolder", path_arg(extra));
        }
        args
    }
}

/// Builds the invocation that hands a query to a patcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartInfoProvider {
    dotnet: String,
}

impl Default for StartInfoProvider {
    fn default() -> Self {
        Self::new("dotnet")
    }
}

impl StartInfoProvider {
    pub fn new(dotnet: impl Into<String>) -> Self {
        Self {
            dotnet: dotnet.into(),
        }
    }

    /// `<exe> <verb> <args…>` when `direct_exe`, otherwise
    /// `dotnet run --project <proj> [--no-build] -- <verb> <args…>`.
    ///
    /// `build` only matters for the `dotnet run` form.
    pub fn start<Q: PatcherQuery + ?Sized>(
        &self,
        path: &Path,
        direct_exe: bool,
        query: &Q,
        build: bool,
        cancel: CancellationToken,
    ) -> ProcessInvocation {
        let invocation = if direct_exe {
            ProcessInvocation::new(path_arg(path), cancel)
        } else {
            let mut inv = ProcessInvocation::new(&self.dotnet, cancel)
                .args(["run", "--project"])
                .arg(path_arg(path));
            if !build {
                inv = inv.arg("--no-build");
            }
            inv.arg("--")
        };

        let invocation = invocation.arg(query.verb()).args(query.to_args());
        match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => invocation.working_dir(dir),
            None => invocation,
        }
    }
}
