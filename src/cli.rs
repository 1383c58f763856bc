// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `patchrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "patchrun",
    version,
    about = "Check out, build and run patcher repositories.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PATCHRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Pin the patcher repository to its configured version.
    Checkout {
        #[arg(long, value_name = "NAME")]
        patcher: String,
    },

    /// Checkout, then build.
    Build {
        #[arg(long, value_name = "NAME")]
        patcher: String,
    },

    /// Checkout, build and ask the patcher whether it can run.
    CheckRunnable {
        #[arg(long, value_name = "NAME")]
        patcher: String,

        #[arg(long, value_name = "PATH")]
        load_order: PathBuf,
    },

    /// Discover how the patcher exposes its settings.
    SettingsStyle {
        #[arg(long, value_name = "NAME")]
        patcher: String,

        /// Build the project before querying.
        #[arg(long)]
        build: bool,
    },

    /// Full pipeline: checkout, build, runnability check, run.
    Run {
        #[arg(long, value_name = "NAME")]
        patcher: String,

        #[arg(long, value_name = "PATH")]
        load_order: PathBuf,

        #[arg(long, value_name = "PATH")]
        output: PathBuf,
    },

    /// Library/framework versions referenced by the patcher.
    Versions {
        #[arg(long, value_name = "NAME")]
        patcher: String,

        /// Report the versions in use instead of the latest available.
        #[arg(long)]
        current: bool,

        #[arg(long)]
        prerelease: bool,
    },
}

impl Command {
    pub fn patcher(&self) -> &str {
        match self {
            Command::Checkout { patcher }
            | Command::Build { patcher }
            | Command::CheckRunnable { patcher, .. }
            | Command::SettingsStyle { patcher, .. }
            | Command::Run { patcher, .. }
            | Command::Versions { patcher, .. } => patcher,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands_with_global_flags() {
        let args = CliArgs::try_parse_from([
            "patchrun",
            "--config",
            "conf/Patchrun.toml",
            "--log-level",
            "debug",
            "check-runnable",
            "--patcher",
            "Demo",
            "--load-order",
            "plugins.txt",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("conf/Patchrun.toml"));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert_eq!(args.command.patcher(), "Demo");
        assert!(matches!(args.command, Command::CheckRunnable { .. }));
    }

    #[test]
    fn config_defaults_to_cwd_file() {
        let args = CliArgs::try_parse_from(["patchrun", "checkout", "--patcher", "Demo"]).unwrap();
        assert_eq!(args.config, PathBuf::from("Patchrun.toml"));
    }
}
