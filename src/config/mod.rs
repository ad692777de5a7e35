// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] holds both the raw TOML shapes and the validated, immutable
//!   specs the rest of the crate runs on.
//! - [`loader`] reads and merges files.
//! - [`validate`] turns a [`RawConfigFile`] into a [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_all, load_and_validate, load_from_path};
pub use model::{
    CommandConfig, CommandSpec, ConfigFile, DaemonConfig, DaemonSpec, LockConfig, LockSpec,
    RawConfigFile, ServerSection, TimerConfig, TimerSpec, VarConfig, VarDecl,
};
