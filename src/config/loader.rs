// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, ServantError};

/// Load one configuration file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load one configuration file and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load, merge and validate `files` followed by every `*.toml` file found
/// directly inside each of `dirs` (sorted by name).
///
/// Failures name the offending path.
pub fn load_all(files: &[PathBuf], dirs: &[PathBuf]) -> Result<ConfigFile> {
    let mut paths: Vec<PathBuf> = files.to_vec();
    for dir in dirs {
        paths.extend(config_files_in(dir)?);
    }

    let mut merged = RawConfigFile::default();
    for path in paths {
        debug!(path = %path.display(), "loading config file");
        let raw = load_from_path(&path).map_err(|e| {
            ServantError::ConfigError(format!("load {} failed: {e}", path.display()))
        })?;
        merged.merge(raw);
    }

    ConfigFile::try_from(merged)
}

fn config_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        ServantError::ConfigError(format!("load {} failed: {e}", dir.display()))
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Config file used when neither `--conf` nor `--confdir` is given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("servant.toml")
}
