#![allow(dead_code)]

use std::path::PathBuf;

use patchrun::config::{ConfigFile, RawConfigFile, RawPatcherConfig, RunnerSection};
use patchrun::types::GameRelease;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_patcher(mut self, name: &str, patcher: RawPatcherConfig) -> Self {
        self.config.patcher.insert(name.to_string(), patcher);
        self
    }

    pub fn with_data_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.runner.data_folder = path.into();
        self
    }

    pub fn with_game_release(mut self, release: &str) -> Self {
        self.config.runner.game_release = GameRelease::new(release);
        self
    }

    pub fn with_short_circuit(mut self, enabled: bool) -> Self {
        self.config.runner.short_circuit = enabled;
        self
    }

    pub fn with_max_captured_lines(mut self, max: usize) -> Self {
        self.config.runner.max_captured_lines = max;
        self
    }

    pub fn runner(&self) -> RunnerSection {
        self.config.runner.clone()
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawPatcherConfig`.
pub struct PatcherConfigBuilder {
    patcher: RawPatcherConfig,
}

impl PatcherConfigBuilder {
    pub fn new(repo: impl Into<PathBuf>, project: &str) -> Self {
        Self {
            patcher: RawPatcherConfig {
                repo: repo.into(),
                project: project.to_string(),
                ..RawPatcherConfig::default()
            },
        }
    }

    pub fn branch(mut self, name: &str) -> Self {
        self.patcher.branch = Some(name.to_string());
        self
    }

    pub fn tag(mut self, name: &str) -> Self {
        self.patcher.tag = Some(name.to_string());
        self
    }

    pub fn commit(mut self, sha: &str) -> Self {
        self.patcher.commit = Some(sha.to_string());
        self
    }

    pub fn build_meta(mut self, path: impl Into<PathBuf>) -> Self {
        self.patcher.build_meta = Some(path.into());
        self
    }

    pub fn build(self) -> RawPatcherConfig {
        self.patcher
    }
}
