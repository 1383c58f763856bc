// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Reserved local branch that checkouts are pinned to.
///
/// It is force-reset to the resolved commit on every checkout and never holds
/// user history.
pub const RUNNER_BRANCH: &str = "patchrun-runner";

/// Length of a canonical (SHA-1) object id in hex digits.
pub const OBJECT_ID_HEX_LEN: usize = 40;

/// How a patcher repository is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningKind {
    Branch,
    Tag,
    Commit,
}

impl fmt::Display for VersioningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersioningKind::Branch => "branch",
            VersioningKind::Tag => "tag",
            VersioningKind::Commit => "commit",
        };
        f.write_str(s)
    }
}

impl FromStr for VersioningKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "branch" => Ok(VersioningKind::Branch),
            "tag" => Ok(VersioningKind::Tag),
            "commit" | "sha" => Ok(VersioningKind::Commit),
            other => Err(format!(
                "invalid versioning kind: {other} (expected \"branch\", \"tag\" or \"commit\")"
            )),
        }
    }
}

/// Which branch/tag/commit a patcher should be checked out at.
///
/// Immutable once built from configuration; `value` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersioningTarget {
    kind: VersioningKind,
    value: String,
}

impl VersioningTarget {
    /// Build a target, rejecting empty values.
    pub fn new(kind: VersioningKind, value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(format!("{kind} target must not be empty"));
        }
        Ok(Self {
            kind,
            value: trimmed.to_string(),
        })
    }

    pub fn branch(value: impl Into<String>) -> Result<Self, String> {
        Self::new(VersioningKind::Branch, value)
    }

    pub fn tag(value: impl Into<String>) -> Result<Self, String> {
        Self::new(VersioningKind::Tag, value)
    }

    pub fn commit(value: impl Into<String>) -> Result<Self, String> {
        Self::new(VersioningKind::Commit, value)
    }

    pub fn kind(&self) -> VersioningKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for VersioningTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.value)
    }
}

/// A full, lower-case hex commit id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    /// Parse a syntactically legal object id (40 hex digits, any case).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != OBJECT_ID_HEX_LEN || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex digits, for log output.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Game release identifier handed through to patchers untouched
/// (e.g. `SkyrimSE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct GameRelease(String);

impl GameRelease {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_id_accepts_full_hex_and_normalises_case() {
        let id = CommitId::parse("46C207318C1531DE7DC2F8E8C2A91ACED183BC30").unwrap();
        assert_eq!(id.as_str(), "46c207318c1531de7dc2f8e8c2a91aced183bc30");
        assert_eq!(id.short(7), "46c2073");
    }

    #[test]
    fn commit_id_rejects_short_and_non_hex() {
        assert!(CommitId::parse("derp").is_none());
        assert!(CommitId::parse("46c2073").is_none());
        assert!(CommitId::parse("zzc207318c1531de7dc2f8e8c2a91aced183bc30").is_none());
    }

    #[test]
    fn empty_target_is_rejected() {
        assert!(VersioningTarget::branch("   ").is_err());
        let t = VersioningTarget::tag(" 1.3.4 ").unwrap();
        assert_eq!(t.value(), "1.3.4");
        assert_eq!(t.kind(), VersioningKind::Tag);
    }

    #[test]
    fn kind_parses_from_str() {
        assert_eq!("Commit".parse::<VersioningKind>(), Ok(VersioningKind::Commit));
        assert!("nope".parse::<VersioningKind>().is_err());
    }
}
