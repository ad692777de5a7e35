// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] turns a [`crate::config::CommandSpec`] into a
//!   [`BuiltCommand`]: parameter validation, expansion, tokenization and
//!   `runas` resolution.
//! - [`pipeline`] spawns a built command, either in the foreground with
//!   captured output and a timeout, or detached in the background.

pub mod command;
pub mod pipeline;

pub use command::{BuiltCommand, CommandBuilder, Credentials};
pub use pipeline::{run_foreground, spawn_background, InputStream};
