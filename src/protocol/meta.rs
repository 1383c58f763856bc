// src/protocol/meta.rs

//! Build meta: a small JSON record stored next to build output that caches
//! capability flags for one specific build.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::fs::FileSystem;

/// What a build was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIdentity {
    pub commit: String,
    pub project_subpath: String,
}

impl BuildIdentity {
    pub fn new(commit: impl Into<String>, project_subpath: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            project_subpath: project_subpath.into(),
        }
    }

    /// Stable hex fingerprint stored in the meta file.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.commit.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.project_subpath.replace('\\', "/").as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for BuildIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.project_subpath, self.commit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMeta {
    /// [`BuildIdentity::fingerprint`] of the build this record belongs to.
    pub identity: String,
    #[serde(default)]
    pub does_not_have_runnability: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_version: Option<String>,
}

impl BuildMeta {
    /// Fresh record with no cached flags.
    pub fn new(identity: &BuildIdentity) -> Self {
        Self {
            identity: identity.fingerprint(),
            commit: Some(identity.commit.clone()),
            ..Self::default()
        }
    }

    pub fn belongs_to(&self, identity: &BuildIdentity) -> bool {
        self.identity == identity.fingerprint()
    }
}

/// Where a build's meta lives and which build it must describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaLocation {
    pub path: std::path::PathBuf,
    pub identity: BuildIdentity,
}

/// Reads and writes [`BuildMeta`] files through a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct BuildMetaStore {
    fs: Arc<dyn FileSystem>,
}

impl BuildMetaStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Read the meta at `path`.
    ///
    /// A missing or unreadable file is `None`; the cache is advisory.
    pub fn read(&self, path: &Path) -> Option<BuildMeta> {
        if !self.fs.is_file(path) {
            return None;
        }
        let text = match self.fs.read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(?path, error = %e, "could not read build meta");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(?path, error = %e, "ignoring malformed build meta");
                None
            }
        }
    }

    /// Meta for this exact build; a record left by another build is ignored.
    pub fn read_for(&self, location: &MetaLocation) -> Option<BuildMeta> {
        let meta = self.read(&location.path)?;
        if meta.belongs_to(&location.identity) {
            Some(meta)
        } else {
            debug!(path = ?location.path, build = %location.identity, "build meta is stale");
            None
        }
    }

    pub fn write(&self, path: &Path, meta: &BuildMeta) -> Result<()> {
        let json = serde_json::to_string_pretty(meta)?;
        self.fs.write(path, json.as_bytes())?;
        debug!(?path, "wrote build meta");
        Ok(())
    }
}
