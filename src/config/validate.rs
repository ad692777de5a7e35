// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;

use crate::config::model::{
    limit_from_secs, CommandConfig, CommandSpec, ConfigFile, DaemonConfig, DaemonSpec,
    LockConfig, LockSpec, RawConfigFile, TimerConfig, TimerSpec, VarConfig, VarDecl,
};
use crate::errors::{Result, ServantError};
use crate::vars::{is_param_name, VarPolicy, MAX_VAR_VALUE_SIZE};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ServantError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let mut vars = BTreeMap::new();
        for (group, items) in raw.vars.iter() {
            ensure_name("vars group", group)?;
            for (name, var) in items.iter() {
                ensure_name("var", name)?;
                let key = format!("{group}.{name}");
                vars.insert(key.clone(), validate_var(&key, var)?);
            }
        }

        let mut commands = BTreeMap::new();
        for (group, items) in raw.commands.iter() {
            ensure_name("commands group", group)?;
            let mut specs = BTreeMap::new();
            for (name, cmd) in items.iter() {
                ensure_name("command", name)?;
                specs.insert(name.clone(), validate_command(group, name, cmd)?);
            }
            commands.insert(group.clone(), specs);
        }

        let mut timers = BTreeMap::new();
        for (name, timer) in raw.timer.iter() {
            ensure_name("timer", name)?;
            timers.insert(name.clone(), validate_timer(name, timer)?);
        }

        let mut daemons = BTreeMap::new();
        for (name, daemon) in raw.daemon.iter() {
            ensure_name("daemon", name)?;
            daemons.insert(name.clone(), validate_daemon(name, daemon)?);
        }

        Ok(ConfigFile {
            server: raw.server,
            vars,
            commands,
            timers,
            daemons,
        })
    }
}

fn ensure_name(what: &str, name: &str) -> Result<()> {
    if !is_param_name(name) {
        return Err(ServantError::ConfigError(format!(
            "invalid {what} name '{name}' (expected ^[a-zA-Z]\\w*$)"
        )));
    }
    Ok(())
}

fn compile(owner: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        ServantError::ConfigError(format!("{owner}: invalid pattern '{pattern}': {e}"))
    })
}

fn validate_var(key: &str, var: &VarConfig) -> Result<VarDecl> {
    if var.value.len() > MAX_VAR_VALUE_SIZE {
        return Err(ServantError::ConfigError(format!(
            "var {key}: value longer than {MAX_VAR_VALUE_SIZE} bytes"
        )));
    }
    let patterns = var
        .patterns
        .iter()
        .map(|p| compile(&format!("var {key}"), p))
        .collect::<Result<Vec<_>>>()?;

    Ok(VarDecl {
        value: var.value.clone(),
        expandable: var.expand,
        policy: VarPolicy {
            readonly: var.readonly,
            patterns,
        },
    })
}

fn validate_lock(owner: &str, lock: &LockConfig) -> Result<LockSpec> {
    let name = lock.name.trim();
    if name.is_empty() {
        return Err(ServantError::ConfigError(format!(
            "{owner}: lock name must not be empty"
        )));
    }
    Ok(LockSpec {
        name: name.to_string(),
        timeout: limit_from_secs(lock.timeout),
        wait_mode: lock.wait.into(),
    })
}

/// Commands with empty code are accepted here and rejected when built.
fn validate_command(group: &str, name: &str, cmd: &CommandConfig) -> Result<CommandSpec> {
    let owner = format!("command {group}.{name}");

    let validators = cmd
        .validate
        .iter()
        .map(|(param, pattern)| Ok((param.clone(), compile(&owner, pattern)?)))
        .collect::<Result<BTreeMap<_, _>>>()?;

    let lock = cmd
        .lock
        .as_ref()
        .map(|l| validate_lock(&owner, l))
        .transpose()?;

    Ok(CommandSpec {
        language: cmd.lang,
        code: cmd.code.trim().to_string(),
        timeout: limit_from_secs(cmd.timeout),
        run_as: non_empty(cmd.runas.as_deref()),
        background: cmd.background,
        lock,
        validators,
    })
}

fn validate_timer(name: &str, timer: &TimerConfig) -> Result<TimerSpec> {
    if timer.code.trim().is_empty() {
        return Err(ServantError::ConfigError(format!(
            "timer {name}: code must not be empty"
        )));
    }
    if timer.tick <= 0 {
        return Err(ServantError::ConfigError(format!(
            "timer {name}: tick must be >= 1 (got {})",
            timer.tick
        )));
    }
    Ok(TimerSpec {
        language: timer.lang,
        code: timer.code.trim().to_string(),
        run_as: non_empty(timer.runas.as_deref()),
        tick: Duration::from_secs(timer.tick as u64),
        deadline: limit_from_secs(timer.deadline),
    })
}

fn validate_daemon(name: &str, daemon: &DaemonConfig) -> Result<DaemonSpec> {
    if daemon.code.trim().is_empty() {
        return Err(ServantError::ConfigError(format!(
            "daemon {name}: code must not be empty"
        )));
    }
    Ok(DaemonSpec {
        language: daemon.lang,
        code: daemon.code.trim().to_string(),
        run_as: non_empty(daemon.runas.as_deref()),
        retries: daemon.retries.clamp(0, i64::from(u32::MAX)) as u32,
        live: daemon.live.map(|s| Duration::from_secs(u64::from(s))),
    })
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
