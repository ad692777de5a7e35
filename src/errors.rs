// src/errors.rs

//! Crate-wide error types.
//!
//! [`ExecError`] is the taxonomy returned by the execution core
//! (`Engine::execute`, `Engine::acquire_and_execute`). Collaborators map
//! [`ErrorKind`] to their own transport status; the core never does.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServantError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Var(#[from] VarError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of an [`ExecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationFailed,
    BuildFailed,
    SpawnFailed,
    RuntimeFailed,
    Timeout,
    IoFailed,
    LockBusy,
    LockTimeout,
    ExpansionFailed,
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("validate params failed")]
    ValidationFailed,

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("execution error: {0}")]
    SpawnFailed(String),

    #[error("execution error: exit status {status:?}: {output}")]
    RuntimeFailed { status: Option<i32>, output: String },

    #[error("command execution timeout: {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    IoFailed(String),

    #[error("lock {0} is held by another operation")]
    LockBusy(String),

    #[error("timed out waiting for lock {0}")]
    LockTimeout(String),

    #[error("some params missing: {0}")]
    ExpansionFailed(String),
}

impl ExecError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::ValidationFailed => ErrorKind::ValidationFailed,
            ExecError::BuildFailed(_) => ErrorKind::BuildFailed,
            ExecError::SpawnFailed(_) => ErrorKind::SpawnFailed,
            ExecError::RuntimeFailed { .. } => ErrorKind::RuntimeFailed,
            ExecError::Timeout(_) => ErrorKind::Timeout,
            ExecError::IoFailed(_) => ErrorKind::IoFailed,
            ExecError::LockBusy(_) => ErrorKind::LockBusy,
            ExecError::LockTimeout(_) => ErrorKind::LockTimeout,
            ExecError::ExpansionFailed(_) => ErrorKind::ExpansionFailed,
        }
    }
}

/// Rejections of a policy-checked variable write.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VarError {
    #[error("var {0} not found")]
    NotFound(String),

    #[error("var {0} is readonly")]
    ReadOnly(String),

    #[error("value of var {0} does not match any pattern")]
    PatternMismatch(String),

    #[error("value of var {key} too large ({len} > {max} bytes)")]
    TooLarge { key: String, len: usize, max: usize },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ServantError>;
