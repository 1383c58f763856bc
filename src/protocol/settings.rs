// src/protocol/settings.rs

//! Settings-style discovery.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::WorkQueue;
use crate::errors::Result;
use crate::exec::{CaptureOptions, ProcessRunner};
use crate::patcher::build::BuildStep;
use crate::protocol::codes::ExitCode;
use crate::protocol::query::{SettingsQuery, StartInfoProvider};

/// How a patcher exposes its settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SettingsStyle {
    #[default]
    None,
    /// The patcher opens its own settings UI.
    Open,
    /// The patcher reflects one or more settings classes.
    SpecifiedClass,
}

/// One reflected settings class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsTarget {
    pub type_name: String,
    pub anchor_path: String,
    pub target_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsStyleResult {
    pub style: SettingsStyle,
    pub targets: Vec<SettingsTarget>,
}

/// Turns the lines a patcher prints for `AutogeneratedSettingsClass` into
/// settings targets.
pub trait SettingsLineParser: Send + Sync {
    fn parse(&self, lines: &[String]) -> Vec<SettingsTarget>;
}

/// `TypeName|AnchorPath|TargetPath` per line. Anything else is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedSettingsParser;

impl SettingsLineParser for DelimitedSettingsParser {
    fn parse(&self, lines: &[String]) -> Vec<SettingsTarget> {
        lines
            .iter()
            .filter_map(|line| {
                let mut parts = line.trim().split('|').map(str::trim);
                let type_name = parts.next().filter(|s| !s.is_empty())?;
                let anchor_path = parts.next()?;
                let target_path = parts.next()?;
                if parts.next().is_some() {
                    return None;
                }
                Some(SettingsTarget {
                    type_name: type_name.to_string(),
                    anchor_path: anchor_path.to_string(),
                    target_path: target_path.to_string(),
                })
            })
            .collect()
    }
}

/// Asks a patcher how it exposes settings.
///
/// The query launch goes through the patcher's [`WorkQueue`], after the
/// optional build has left it.
#[derive(Clone)]
pub struct SettingsStyleQuery {
    runner: Arc<dyn ProcessRunner>,
    queue: Arc<WorkQueue>,
    start: StartInfoProvider,
    parser: Arc<dyn SettingsLineParser>,
    builder: Arc<dyn BuildStep>,
}

impl fmt::Debug for SettingsStyleQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStyleQuery")
            .field("queue", &self.queue)
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

impl SettingsStyleQuery {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        queue: Arc<WorkQueue>,
        start: StartInfoProvider,
        parser: Arc<dyn SettingsLineParser>,
        builder: Arc<dyn BuildStep>,
    ) -> Self {
        Self {
            runner,
            queue,
            start,
            parser,
            builder,
        }
    }

    /// Discover the settings style of the patcher at `path`.
    ///
    /// With `build` set the project is built first and a build failure is
    /// returned as is. Prebuilt executables are never built.
    pub async fn get(
        &self,
        path: &Path,
        direct_exe: bool,
        build: bool,
        cancel: &CancellationToken,
    ) -> Result<SettingsStyleResult> {
        if build && !direct_exe {
            self.builder.build(path, cancel).await?.into_result()?;
        }

        let invocation = self.start.start(path, direct_exe, &SettingsQuery, false, cancel.clone());
        debug!(%invocation, "querying settings style");
        let runner = Arc::clone(&self.runner);
        let output = self
            .queue
            .enqueue(cancel, move |token| async move {
                let mut invocation = invocation;
                invocation.cancel = token;
                runner.run(invocation, CaptureOptions::unbounded()).await
            })
            .await?;

        let result = match ExitCode::from_raw(output.exit_code) {
            ExitCode::OpensForSettings => SettingsStyleResult {
                style: SettingsStyle::Open,
                targets: Vec::new(),
            },
            ExitCode::AutogeneratedSettingsClass => SettingsStyleResult {
                style: SettingsStyle::SpecifiedClass,
                targets: self.parser.parse(&output.stdout),
            },
            _ => SettingsStyleResult::default(),
        };
        info!(?path, style = ?result.style, targets = result.targets.len(), "settings style");
        Ok(result)
    }
}
