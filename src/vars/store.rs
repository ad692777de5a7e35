// src/vars/store.rs

//! Process-wide variable registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use regex::Regex;
use tracing::{debug, warn};

use crate::errors::VarError;
use crate::vars::is_param_name;

/// Largest value accepted by a policy-checked write.
pub const MAX_VAR_VALUE_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub value: String,
    /// When set, the value is itself expanded before substitution.
    pub expandable: bool,
}

/// Write policy for a config-declared variable.
#[derive(Debug, Clone, Default)]
pub struct VarPolicy {
    pub readonly: bool,
    /// A written value must match at least one of these.
    pub patterns: Vec<Regex>,
}

#[derive(Debug, Default)]
struct StoreState {
    vars: HashMap<String, Variable>,
    policies: HashMap<String, VarPolicy>,
}

/// Namespaced key/value registry guarded by one mutex.
///
/// Keys look like `group.name`, `_env.NAME` or `_arg.NAME`. Entries are
/// overwritten but never removed.
#[derive(Debug, Default)]
pub struct VariableStore {
    state: Mutex<StoreState>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, expandable: bool) {
        let key = key.into();
        let value = value.into();
        debug!(var = %key, expandable, "setting variable");
        self.state().vars.insert(key, Variable { value, expandable });
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state().vars.get(key).map(|v| v.value.clone())
    }

    pub fn entry(&self, key: &str) -> Option<Variable> {
        self.state().vars.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().vars.contains_key(key)
    }

    /// Register a config-declared variable together with its write policy.
    pub fn declare(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        expandable: bool,
        policy: VarPolicy,
    ) {
        let key = key.into();
        let mut state = self.state();
        state.vars.insert(
            key.clone(),
            Variable {
                value: value.into(),
                expandable,
            },
        );
        state.policies.insert(key, policy);
    }

    /// Overwrite a declared variable, subject to its policy.
    ///
    /// The expandable flag is left untouched.
    pub fn write_checked(&self, key: &str, value: &str) -> Result<(), VarError> {
        if value.len() > MAX_VAR_VALUE_SIZE {
            return Err(VarError::TooLarge {
                key: key.to_string(),
                len: value.len(),
                max: MAX_VAR_VALUE_SIZE,
            });
        }

        let mut state = self.state();
        let policy = state
            .policies
            .get(key)
            .ok_or_else(|| VarError::NotFound(key.to_string()))?;

        if policy.readonly {
            return Err(VarError::ReadOnly(key.to_string()));
        }
        if !policy.patterns.iter().any(|re| re.is_match(value)) {
            return Err(VarError::PatternMismatch(key.to_string()));
        }

        let expandable = state.vars.get(key).map(|v| v.expandable).unwrap_or(false);
        state.vars.insert(
            key.to_string(),
            Variable {
                value: value.to_string(),
                expandable,
            },
        );
        Ok(())
    }

    /// Import `name=value` pairs under `prefix`, skipping malformed names.
    ///
    /// Returns how many pairs were accepted.
    pub fn seed<I, S>(&self, prefix: &str, pairs: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut accepted = 0;
        let mut state = self.state();
        for pair in pairs {
            let pair = pair.as_ref();
            let Some((name, value)) = pair.split_once('=') else {
                warn!(pair = %pair, prefix, "ignoring variable without '='");
                continue;
            };
            if !is_param_name(name) {
                debug!(name, prefix, "ignoring variable with unsupported name");
                continue;
            }
            state.vars.insert(
                format!("{prefix}{name}"),
                Variable {
                    value: value.to_string(),
                    expandable: false,
                },
            );
            accepted += 1;
        }
        accepted
    }

    /// Import `--var k=v` arguments as `_arg.k`.
    pub fn seed_args<I, S>(&self, args: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.seed("_arg.", args)
    }

    /// Import the process environment as `_env.NAME`.
    pub fn seed_env(&self) -> usize {
        self.seed(
            "_env.",
            std::env::vars().map(|(k, v)| format!("{k}={v}")),
        )
    }

    /// Copy of every variable value, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.state()
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }
}
