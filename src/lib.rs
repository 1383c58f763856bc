// src/lib.rs

pub mod checkout;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod git;
pub mod logging;
pub mod patcher;
pub mod protocol;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_and_validate};
use crate::engine::ScopedQueues;
use crate::errors::PatchrunError;
use crate::exec::RealProcessRunner;
use crate::fs::RealFileSystem;
use crate::patcher::PatcherPipeline;
use crate::protocol::{RunnabilityOutcome, SettingsStyle};

/// High-level entry point used by `main.rs`.
///
/// Loads the config, builds the selected patcher's pipeline and runs the
/// requested command. Ctrl-C cancels everything in flight, killing any
/// subprocess that is still running.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let pipeline = pipeline_for(&cfg, args.command.patcher())?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; cancelling");
            cancel.cancel();
        });
    }

    execute(&cfg, &pipeline, args.command, &cancel).await
}

fn pipeline_for(cfg: &ConfigFile, name: &str) -> Result<PatcherPipeline> {
    let patcher = cfg.patcher(name).cloned().ok_or_else(|| {
        PatchrunError::ConfigError(format!(
            "unknown patcher '{name}' (configured: {})",
            cfg.patcher_names().join(", ")
        ))
    })?;

    Ok(PatcherPipeline::new(
        patcher,
        cfg.runner.clone(),
        Arc::new(RealProcessRunner::new()),
        Arc::new(RealFileSystem),
        &ScopedQueues::new(),
    ))
}

async fn execute(
    cfg: &ConfigFile,
    pipeline: &PatcherPipeline,
    command: Command,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Command::Checkout { .. } => {
            let checkout = pipeline.checkout(cancel).await?;
            println!("commit:  {}", checkout.commit);
            println!("branch:  {}", checkout.runner_branch);
            println!("project: {}", checkout.project_path.display());
        }
        Command::Build { .. } => {
            let checkout = pipeline.prepare(cancel).await?;
            println!("built {} at {}", checkout.project_subpath, checkout.commit);
        }
        Command::CheckRunnable { load_order, .. } => {
            match pipeline.check_runnability(&load_order, cancel).await? {
                RunnabilityOutcome::NotRunnable(reason) => {
                    return Err(PatchrunError::NotRunnable(reason).into());
                }
                RunnabilityOutcome::ShortCircuited => println!("runnable (cached)"),
                RunnabilityOutcome::Runnable(code) => println!("runnable ({code})"),
            }
        }
        Command::SettingsStyle { build, .. } => {
            let result = pipeline.settings_style(build, cancel).await?;
            let style = match result.style {
                SettingsStyle::None => "none",
                SettingsStyle::Open => "open",
                SettingsStyle::SpecifiedClass => "specified-class",
            };
            println!("style: {style}");
            for target in result.targets {
                println!(
                    "  {} ({} -> {})",
                    target.type_name, target.anchor_path, target.target_path
                );
            }
        }
        Command::Run {
            load_order, output, ..
        } => {
            let report = pipeline.run(&load_order, &output, cancel).await?;
            println!("{} -> {}", report.commit, report.output_path.display());
        }
        Command::Versions {
            current,
            prerelease,
            ..
        } => {
            let versions = pipeline
                .versions(&cfg.versions.packages(), current, prerelease, cancel)
                .await?;
            println!("library:   {}", versions.library.as_deref().unwrap_or("-"));
            println!("framework: {}", versions.framework.as_deref().unwrap_or("-"));
        }
    }
    Ok(())
}
