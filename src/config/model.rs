// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::exec::command::{DEFAULT_SHELL, DEFAULT_WORK_DIR};
use crate::types::{Language, LockWaitMode};
use crate::vars::VarPolicy;

/// Top-level configuration as read from one TOML file.
///
/// ```toml
/// [server]
/// log = "/var/log/servant.log"
///
/// [vars.app]
/// mode = { value = "prod", patterns = ["^(prod|staging)$"] }
///
/// [commands.app.restart]
/// lang = "exec"
/// code = "systemctl restart ${service}"
/// timeout = 30
/// validate = { service = "^[a-z]+$" }
///
/// [timer.cleanup]
/// code = "find /tmp -mtime +7 -delete"
/// tick = 60
///
/// [daemon.worker]
/// code = "exec /usr/bin/worker"
/// retries = 3
/// live = 10
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    /// `[vars.<group>.<name>]`
    #[serde(default)]
    pub vars: BTreeMap<String, BTreeMap<String, VarConfig>>,

    /// `[commands.<group>.<name>]`
    #[serde(default)]
    pub commands: BTreeMap<String, BTreeMap<String, CommandConfig>>,

    /// `[timer.<name>]`
    #[serde(default)]
    pub timer: BTreeMap<String, TimerConfig>,

    /// `[daemon.<name>]`
    #[serde(default)]
    pub daemon: BTreeMap<String, DaemonConfig>,
}

impl RawConfigFile {
    /// Fold a later file into this one.
    ///
    /// Server keys already set here win; named items from `other` replace
    /// same-named items here.
    pub fn merge(&mut self, other: RawConfigFile) {
        self.server.log = self.server.log.take().or(other.server.log);
        self.server.shell = self.server.shell.take().or(other.server.shell);
        self.server.work_dir = self.server.work_dir.take().or(other.server.work_dir);

        for (group, vars) in other.vars {
            self.vars.entry(group).or_default().extend(vars);
        }
        for (group, commands) in other.commands {
            self.commands.entry(group).or_default().extend(commands);
        }
        self.timer.extend(other.timer);
        self.daemon.extend(other.daemon);
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    /// Append logs to this file instead of stderr.
    #[serde(default)]
    pub log: Option<PathBuf>,

    /// Interpreter for `lang = "shell"`.
    #[serde(default)]
    pub shell: Option<String>,

    /// Directory every command starts in.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl ServerSection {
    pub fn effective_shell(&self) -> &str {
        self.shell.as_deref().unwrap_or(DEFAULT_SHELL)
    }

    pub fn effective_work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR))
    }
}

/// `[vars.<group>.<name>]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VarConfig {
    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub readonly: bool,

    /// A written value must match one of these.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Expand `${...}` in the value when it is substituted.
    #[serde(default)]
    pub expand: bool,
}

/// `[commands.<group>.<name>]`
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub lang: Language,

    #[serde(default)]
    pub code: String,

    /// Seconds; 0 means unlimited.
    #[serde(default)]
    pub timeout: u32,

    #[serde(default)]
    pub runas: Option<String>,

    #[serde(default)]
    pub background: bool,

    #[serde(default)]
    pub lock: Option<LockConfig>,

    /// Parameter name -> regex the parameter's value must match.
    #[serde(default)]
    pub validate: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    pub name: String,

    /// Seconds; 0 means unlimited.
    #[serde(default)]
    pub timeout: u32,

    #[serde(default)]
    pub wait: bool,
}

/// `[timer.<name>]`
#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    #[serde(default)]
    pub lang: Language,

    pub code: String,

    #[serde(default)]
    pub runas: Option<String>,

    /// Seconds between runs; must be positive.
    #[serde(default)]
    pub tick: i64,

    /// Seconds each run may take; 0 means unlimited.
    #[serde(default)]
    pub deadline: u32,
}

/// `[daemon.<name>]`
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub lang: Language,

    pub code: String,

    #[serde(default)]
    pub runas: Option<String>,

    /// Negative values count as 0.
    #[serde(default)]
    pub retries: i64,

    /// Seconds of uptime after which the retry count resets. Absent: never.
    #[serde(default)]
    pub live: Option<u32>,
}

/// Seconds where 0 means "no limit".
pub(crate) fn limit_from_secs(secs: u32) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(u64::from(secs)))
}

// ---------------------------------------------------------------------------
// Validated specs
// ---------------------------------------------------------------------------

/// A configured command, immutable once loaded.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub language: Language,
    pub code: String,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    pub run_as: Option<String>,
    pub background: bool,
    pub lock: Option<LockSpec>,
    pub validators: BTreeMap<String, Regex>,
}

impl CommandSpec {
    pub fn new(language: Language, code: impl Into<String>) -> Self {
        Self {
            language,
            code: code.into(),
            timeout: None,
            run_as: None,
            background: false,
            lock: None,
            validators: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSpec {
    pub name: String,
    /// `None` waits forever (only meaningful in `Wait` mode).
    pub timeout: Option<Duration>,
    pub wait_mode: LockWaitMode,
}

#[derive(Debug, Clone)]
pub struct DaemonSpec {
    pub language: Language,
    pub code: String,
    pub run_as: Option<String>,
    pub retries: u32,
    pub live: Option<Duration>,
}

impl DaemonSpec {
    /// Daemons run detached with no timeout.
    pub fn to_command(&self) -> CommandSpec {
        CommandSpec {
            run_as: self.run_as.clone(),
            background: true,
            ..CommandSpec::new(self.language, self.code.clone())
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerSpec {
    pub language: Language,
    pub code: String,
    pub run_as: Option<String>,
    pub tick: Duration,
    pub deadline: Option<Duration>,
}

impl TimerSpec {
    /// Timer runs are foreground with the deadline as timeout.
    pub fn to_command(&self) -> CommandSpec {
        CommandSpec {
            run_as: self.run_as.clone(),
            timeout: self.deadline,
            ..CommandSpec::new(self.language, self.code.clone())
        }
    }
}

/// A config-declared variable.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub value: String,
    pub expandable: bool,
    pub policy: VarPolicy,
}

/// Validated configuration.
///
/// Construct via `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub server: ServerSection,
    /// Keyed `group.name`.
    pub vars: BTreeMap<String, VarDecl>,
    /// group -> name -> command
    pub commands: BTreeMap<String, BTreeMap<String, CommandSpec>>,
    pub timers: BTreeMap<String, TimerSpec>,
    pub daemons: BTreeMap<String, DaemonSpec>,
}

impl ConfigFile {
    pub fn command(&self, group: &str, name: &str) -> Option<&CommandSpec> {
        self.commands.get(group)?.get(name)
    }
}
