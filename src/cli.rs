// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `servant`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "servant",
    version,
    about = "Run pre-configured commands, timers and supervised daemons.",
    long_about = None
)]
pub struct CliArgs {
    /// Config file (TOML). May be repeated; later files override earlier ones.
    ///
    /// Default: `servant.toml` when neither `--conf` nor `--confdir` is given.
    #[arg(long = "conf", value_name = "PATH")]
    pub conf: Vec<PathBuf>,

    /// Directory whose `*.toml` files are loaded after `--conf` files.
    #[arg(long = "confdir", value_name = "DIR")]
    pub confdir: Vec<PathBuf>,

    /// Variable available to commands as `${_arg.NAME}`.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub var: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SERVANT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the configuration, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Execute one configured command and exit instead of serving.
    #[arg(long, value_name = "GROUP.COMMAND")]
    pub run: Option<String>,

    /// Request parameter for `--run`, available as `${NAME}`.
    #[arg(long = "param", value_name = "NAME=VALUE", requires = "run")]
    pub param: Vec<String>,

    /// Feed this process's stdin to the `--run` command.
    #[arg(long, requires = "run")]
    pub stdin: bool,
}

impl CliArgs {
    /// Config files to load, falling back to the default path.
    pub fn config_files(&self) -> Vec<PathBuf> {
        if self.conf.is_empty() && self.confdir.is_empty() {
            vec![crate::config::default_config_path()]
        } else {
            self.conf.clone()
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
