// src/exec/command.rs

//! Turning a [`CommandSpec`] into a ready-to-spawn process description.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use nix::unistd::{Uid, User};
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::config::CommandSpec;
use crate::errors::ExecError;
use crate::types::Language;
use crate::vars::{expand, identity, validate_params, Lookup};

/// Interpreter used for `lang = "shell"` unless configured otherwise.
pub const DEFAULT_SHELL: &str = "bash";

/// Working directory every command starts in unless configured otherwise.
pub const DEFAULT_WORK_DIR: &str = "/";

/// A double-quoted run, a single-quoted run, or a run of anything else that
/// is neither ASCII whitespace nor a quote.
static ARG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|'[^']*'|[^ \t\n\f\r"']+"#).expect("static regex"));

/// Split exec-style code into tokens, stripping surrounding quotes.
///
/// No expansion happens here.
pub fn tokenize(code: &str) -> Vec<String> {
    ARG_TOKEN
        .find_iter(code)
        .map(|m| {
            let tok = m.as_str();
            let quoted = tok.len() >= 2
                && (tok.starts_with('"') && tok.ends_with('"')
                    || tok.starts_with('\'') && tok.ends_with('\''));
            if quoted {
                tok[1..tok.len() - 1].to_string()
            } else {
                tok.to_string()
            }
        })
        .collect()
}

/// Tokenize `code` and expand every token independently.
///
/// Returns `None` if any single token fails to expand, or if there is no
/// token at all. The first element is the program.
pub fn exec_args<L: Lookup + ?Sized>(code: &str, lookup: &L) -> Option<(String, Vec<String>)> {
    let mut args = tokenize(code)
        .iter()
        .map(|tok| expand(tok, lookup, identity))
        .collect::<Option<Vec<String>>>()?;
    if args.is_empty() {
        return None;
    }
    let program = args.remove(0);
    Some((program, args))
}

/// Numeric credentials a child process should run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

/// Resolve an account name (or a numeric uid) to credentials.
pub fn resolve_user(user: &str) -> Result<Credentials, ExecError> {
    // A numeric uid without a passwd entry runs with gid == uid.
    let found = match user.parse::<u32>() {
        Ok(uid) => User::from_uid(Uid::from_raw(uid)).map(|entry| {
            Some(entry.map_or((uid, uid), |u| (u.uid.as_raw(), u.gid.as_raw())))
        }),
        Err(_) => User::from_name(user)
            .map(|entry| entry.map(|u| (u.uid.as_raw(), u.gid.as_raw()))),
    };

    match found {
        Ok(Some((uid, gid))) => Ok(Credentials { uid, gid }),
        Ok(None) => Err(ExecError::BuildFailed(format!(
            "set user failed: unknown user {user}"
        ))),
        Err(e) => Err(ExecError::BuildFailed(format!(
            "set user failed: {user}: {e}"
        ))),
    }
}

/// Everything needed to spawn one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub credentials: Option<Credentials>,
    /// Detached: own session, no stdio, nobody waits for output.
    pub background: bool,
}

impl BuiltCommand {
    /// Create the `tokio` command with stdio and process attributes wired.
    ///
    /// - foreground: stdout and stderr piped, stdin piped only when there is
    ///   input, own process group so a timeout can kill the whole group.
    /// - background: all stdio discarded, new session so the process
    ///   outlives the caller.
    pub fn to_command(&self, with_input: bool) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.work_dir);

        if let Some(creds) = self.credentials {
            cmd.uid(creds.uid).gid(creds.gid);
        }

        if self.background {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            // SAFETY: setsid is async-signal-safe and touches no memory
            // shared with the parent.
            unsafe {
                cmd.pre_exec(|| {
                    nix::unistd::setsid()
                        .map(|_| ())
                        .map_err(std::io::Error::from)
                });
            }
        } else {
            cmd.stdin(if with_input {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        }

        cmd
    }

    /// Program followed by its arguments, for logging.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Builds [`BuiltCommand`]s from configured commands.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    shell: String,
    work_dir: PathBuf,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL, DEFAULT_WORK_DIR)
    }
}

impl CommandBuilder {
    pub fn new(shell: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Validate parameters and build the process description.
    ///
    /// Order of checks: validators, empty code, argument expansion (exec
    /// only), user resolution.
    pub fn build<L: Lookup + ?Sized>(
        &self,
        spec: &CommandSpec,
        lookup: &L,
    ) -> Result<BuiltCommand, ExecError> {
        if !validate_params(&spec.validators, lookup) {
            return Err(ExecError::ValidationFailed);
        }

        let code = spec.code.trim();
        if code.is_empty() {
            return Err(ExecError::BuildFailed("command code is empty".to_string()));
        }

        let (program, args) = match spec.language {
            Language::Exec => exec_args(code, lookup)
                .ok_or_else(|| ExecError::ExpansionFailed(code.to_string()))?,
            Language::Shell => (
                self.shell.clone(),
                vec!["-c".to_string(), code.to_string()],
            ),
        };

        let credentials = spec.run_as.as_deref().map(resolve_user).transpose()?;

        let built = BuiltCommand {
            program,
            args,
            work_dir: self.work_dir.clone(),
            credentials,
            background: spec.background,
        };
        debug!(argv = ?built.argv(), background = built.background, "command built");
        Ok(built)
    }
}
