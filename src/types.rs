use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

/// How a command's `code` is turned into a process.
///
/// - `Shell`: the whole code string goes to `<shell> -c <code>`, unexpanded
///   (default).
/// - `Exec`: the code is tokenized, each token is expanded, and the first
///   token is run directly as the program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    Shell,
    Exec,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "shell" | "bash" | "sh" => Ok(Language::Shell),
            "exec" => Ok(Language::Exec),
            other => Err(format!(
                "unknown language: {other} (expected \"exec\" or \"shell\")"
            )),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Shell => f.write_str("shell"),
            Language::Exec => f.write_str("exec"),
        }
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What a lock acquisition does when the lock is already held.
///
/// - `Try`: give up immediately.
/// - `Wait`: block until the lock's timeout elapses (or forever when the
///   timeout is unlimited).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockWaitMode {
    #[default]
    Try,
    Wait,
}

impl From<bool> for LockWaitMode {
    fn from(wait: bool) -> Self {
        if wait {
            LockWaitMode::Wait
        } else {
            LockWaitMode::Try
        }
    }
}
