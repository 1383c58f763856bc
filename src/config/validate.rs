// src/config/validate.rs

use std::collections::BTreeMap;

use crate::config::model::{ConfigFile, PatcherConfig, RawConfigFile, RawPatcherConfig};
use crate::errors::{PatchrunError, Result};
use crate::protocol::MAX_CAPTURED_LINES;
use crate::types::{VersioningKind, VersioningTarget};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PatchrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_patchers(&raw)?;
        validate_runner(&raw)?;

        let mut patchers = BTreeMap::new();
        for (name, patcher) in raw.patcher {
            let validated = validate_patcher(&name, patcher)?;
            patchers.insert(name, validated);
        }
        Ok(ConfigFile::new_unchecked(raw.runner, raw.versions, patchers))
    }
}

fn ensure_has_patchers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.patcher.is_empty() {
        return Err(PatchrunError::ConfigError(
            "config must contain at least one [patcher.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_runner(cfg: &RawConfigFile) -> Result<()> {
    let lines = cfg.runner.max_captured_lines;
    if !(1..=MAX_CAPTURED_LINES).contains(&lines) {
        return Err(PatchrunError::ConfigError(format!(
            "[runner].max_captured_lines must be between 1 and {MAX_CAPTURED_LINES} (got {lines})"
        )));
    }
    if cfg.runner.dotnet.trim().is_empty() || cfg.runner.git.trim().is_empty() {
        return Err(PatchrunError::ConfigError(
            "[runner].dotnet and [runner].git must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Exactly one of `branch` / `tag` / `commit`, with a non-empty value.
///
/// Commit ids are not checked for hex validity here; the resolver reports a
/// malformed id as a halting checkout error.
fn validate_patcher(name: &str, raw: RawPatcherConfig) -> Result<PatcherConfig> {
    let chosen: Vec<(VersioningKind, &String)> = [
        (VersioningKind::Branch, raw.branch.as_ref()),
        (VersioningKind::Tag, raw.tag.as_ref()),
        (VersioningKind::Commit, raw.commit.as_ref()),
    ]
    .into_iter()
    .filter_map(|(kind, value)| value.map(|v| (kind, v)))
    .collect();

    let (kind, value) = match chosen.as_slice() {
        [single] => *single,
        [] => {
            return Err(PatchrunError::ConfigError(format!(
                "patcher '{name}' must set one of `branch`, `tag` or `commit`"
            )));
        }
        _ => {
            return Err(PatchrunError::ConfigError(format!(
                "patcher '{name}' must set only one of `branch`, `tag` or `commit`"
            )));
        }
    };

    let versioning = VersioningTarget::new(kind, value)
        .map_err(|e| PatchrunError::ConfigError(format!("patcher '{name}': {e}")))?;

    if raw.repo.as_os_str().is_empty() {
        return Err(PatchrunError::ConfigError(format!(
            "patcher '{name}' must set `repo`"
        )));
    }

    Ok(PatcherConfig {
        name: name.to_string(),
        repo: raw.repo,
        project: raw.project,
        versioning,
        build_meta: raw.build_meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(
            r#"
            [patcher.Demo]
            repo = "/repos/demo"
            project = "Demo/Demo.csproj"
            tag = "1.2.0"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.runner.dotnet, "dotnet");
        assert_eq!(cfg.runner.max_captured_lines, 100);
        assert!(cfg.runner.short_circuit);
        let demo = cfg.patcher("Demo").unwrap();
        assert_eq!(demo.versioning.kind(), VersioningKind::Tag);
        assert_eq!(demo.versioning.value(), "1.2.0");
        assert_eq!(cfg.patcher_names(), vec!["Demo"]);
    }

    #[test]
    fn requires_exactly_one_version_selector() {
        let none = parse(
            r#"
            [patcher.Demo]
            repo = "/repos/demo"
            "#,
        );
        assert!(matches!(none, Err(PatchrunError::ConfigError(_))));

        let two = parse(
            r#"
            [patcher.Demo]
            repo = "/repos/demo"
            branch = "main"
            tag = "1.0"
            "#,
        );
        assert!(matches!(two, Err(PatchrunError::ConfigError(m)) if m.contains("only one")));
    }

    #[test]
    fn rejects_empty_values_and_zero_line_cap() {
        let empty = parse(
            r#"
            [patcher.Demo]
            repo = "/repos/demo"
            branch = "  "
            "#,
        );
        assert!(matches!(empty, Err(PatchrunError::ConfigError(_))));

        let zero = parse(
            r#"
            [runner]
            max_captured_lines = 0

            [patcher.Demo]
            repo = "/repos/demo"
            branch = "main"
            "#,
        );
        assert!(matches!(zero, Err(PatchrunError::ConfigError(m)) if m.contains("max_captured_lines")));
    }

    #[test]
    fn line_cap_above_the_maximum_is_rejected() {
        let too_many = parse(
            r#"
            [runner]
            max_captured_lines = 101

            [patcher.Demo]
            repo = "/repos/demo"
            branch = "main"
            "#,
        );
        assert!(matches!(too_many, Err(PatchrunError::ConfigError(m)) if m.contains("got 101")));

        let at_cap = parse(
            r#"
            [runner]
            max_captured_lines = 100

            [patcher.Demo]
            repo = "/repos/demo"
            branch = "main"
            "#,
        )
        .unwrap();
        assert_eq!(at_cap.runner.max_captured_lines, 100);
    }

    #[test]
    fn malformed_commit_is_accepted_here() {
        let cfg = parse(
            r#"
            [patcher.Demo]
            repo = "/repos/demo"
            commit = "derp"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.patcher("Demo").unwrap().versioning.value(), "derp");
    }

    #[test]
    fn no_patchers_is_an_error() {
        assert!(matches!(parse(""), Err(PatchrunError::ConfigError(_))));
    }
}
