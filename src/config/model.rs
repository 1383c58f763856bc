// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::protocol::LibraryPackages;
use crate::protocol::MAX_CAPTURED_LINES;
use crate::types::{GameRelease, VersioningTarget};

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [runner]
/// dotnet = "dotnet"
/// data_folder = "/games/Skyrim/Data"
/// game_release = "SkyrimSE"
///
/// [patcher.MyPatcher]
/// repo = "/patchrun/repos/MyPatcher"
/// project = "MyPatcher/MyPatcher.csproj"
/// branch = "main"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub versions: VersionsSection,

    /// Patchers from `[patcher.<name>]`.
    #[serde(default)]
    pub patcher: BTreeMap<String, RawPatcherConfig>,
}

/// `[runner]` section: how patchers are built and launched.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_dotnet")]
    pub dotnet: String,

    #[serde(default = "default_git")]
    pub git: String,

    /// Skip runnability checks a build has cached as not implemented.
    #[serde(default = "default_short_circuit")]
    pub short_circuit: bool,

    #[serde(default = "default_max_captured_lines")]
    pub max_captured_lines: usize,

    #[serde(default)]
    pub data_folder: PathBuf,

    #[serde(default = "default_game_release")]
    pub game_release: GameRelease,

    #[serde(default)]
    pub extra_data_folder: Option<PathBuf>,
}

fn default_dotnet() -> String {
    "dotnet".to_string()
}

fn default_git() -> String {
    "git".to_string()
}

fn default_short_circuit() -> bool {
    true
}

fn default_max_captured_lines() -> usize {
    MAX_CAPTURED_LINES
}

fn default_game_release() -> GameRelease {
    GameRelease::new("SkyrimSE")
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            dotnet: default_dotnet(),
            git: default_git(),
            short_circuit: default_short_circuit(),
            max_captured_lines: default_max_captured_lines(),
            data_folder: PathBuf::new(),
            game_release: default_game_release(),
            extra_data_folder: None,
        }
    }
}

/// `[versions]` section: which packages carry library versions.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionsSection {
    #[serde(default = "default_library_prefix")]
    pub library_prefix: String,

    #[serde(default = "default_framework_package")]
    pub framework_package: String,
}

fn default_library_prefix() -> String {
    LibraryPackages::default().library_prefix
}

fn default_framework_package() -> String {
    LibraryPackages::default().framework_package
}

impl Default for VersionsSection {
    fn default() -> Self {
        Self {
            library_prefix: default_library_prefix(),
            framework_package: default_framework_package(),
        }
    }
}

impl VersionsSection {
    pub fn packages(&self) -> LibraryPackages {
        LibraryPackages {
            library_prefix: self.library_prefix.clone(),
            framework_package: self.framework_package.clone(),
        }
    }
}

/// `[patcher.<name>]` as written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPatcherConfig {
    pub repo: PathBuf,

    /// Project path relative to the solution. May be empty in the file; an
    /// empty project is reported when the checkout validates paths.
    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub tag: Option<String>,

    #[serde(default)]
    pub commit: Option<String>,

    #[serde(default)]
    pub build_meta: Option<PathBuf>,
}

/// A validated patcher entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatcherConfig {
    pub name: String,
    pub repo: PathBuf,
    pub project: String,
    pub versioning: VersioningTarget,
    pub build_meta: Option<PathBuf>,
}

/// Validated configuration. Only constructed through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub runner: RunnerSection,
    pub versions: VersionsSection,
    patchers: BTreeMap<String, PatcherConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        runner: RunnerSection,
        versions: VersionsSection,
        patchers: BTreeMap<String, PatcherConfig>,
    ) -> Self {
        Self {
            runner,
            versions,
            patchers,
        }
    }

    pub fn patcher(&self, name: &str) -> Option<&PatcherConfig> {
        self.patchers.get(name)
    }

    pub fn patchers(&self) -> impl Iterator<Item = &PatcherConfig> {
        self.patchers.values()
    }

    pub fn patcher_names(&self) -> Vec<&str> {
        self.patchers.keys().map(String::as_str).collect()
    }
}
