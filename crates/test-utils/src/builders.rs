#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use regex::Regex;
use servant::config::{CommandSpec, DaemonSpec, LockSpec, TimerSpec};
use servant::types::{Language, LockWaitMode};
use servant::vars::Lookup;

/// Builder for `CommandSpec` to simplify test setup.
pub struct CommandSpecBuilder {
    spec: CommandSpec,
}

impl CommandSpecBuilder {
    pub fn shell(code: &str) -> Self {
        Self {
            spec: CommandSpec::new(Language::Shell, code),
        }
    }

    pub fn exec(code: &str) -> Self {
        Self {
            spec: CommandSpec::new(Language::Exec, code),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.spec.timeout = Some(timeout);
        self
    }

    pub fn run_as(mut self, user: &str) -> Self {
        self.spec.run_as = Some(user.to_string());
        self
    }

    pub fn background(mut self) -> Self {
        self.spec.background = true;
        self
    }

    pub fn try_lock(mut self, name: &str) -> Self {
        self.spec.lock = Some(LockSpec {
            name: name.to_string(),
            timeout: None,
            wait_mode: LockWaitMode::Try,
        });
        self
    }

    pub fn wait_lock(mut self, name: &str, timeout: Option<Duration>) -> Self {
        self.spec.lock = Some(LockSpec {
            name: name.to_string(),
            timeout,
            wait_mode: LockWaitMode::Wait,
        });
        self
    }

    pub fn validate(mut self, param: &str, pattern: &str) -> Self {
        let re = Regex::new(pattern).expect("test validator pattern");
        self.spec.validators.insert(param.to_string(), re);
        self
    }

    pub fn build(self) -> CommandSpec {
        self.spec
    }
}

/// Builder for `DaemonSpec`.
pub struct DaemonSpecBuilder {
    spec: DaemonSpec,
}

impl DaemonSpecBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            spec: DaemonSpec {
                language: Language::Shell,
                code: code.to_string(),
                run_as: None,
                retries: 0,
                live: None,
            },
        }
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.spec.retries = retries;
        self
    }

    pub fn live(mut self, live: Duration) -> Self {
        self.spec.live = Some(live);
        self
    }

    pub fn build(self) -> DaemonSpec {
        self.spec
    }
}

/// Builder for `TimerSpec`.
pub struct TimerSpecBuilder {
    spec: TimerSpec,
}

impl TimerSpecBuilder {
    pub fn new(code: &str, tick: Duration) -> Self {
        Self {
            spec: TimerSpec {
                language: Language::Shell,
                code: code.to_string(),
                run_as: None,
                tick,
                deadline: None,
            },
        }
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.spec.deadline = Some(deadline);
        self
    }

    pub fn build(self) -> TimerSpec {
        self.spec
    }
}

/// A `Lookup` over a fixed map, for expansion tests.
#[derive(Debug, Clone, Default)]
pub struct MapLookup {
    values: HashMap<String, String>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl Lookup for MapLookup {
    fn lookup(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Validators map from `(param, pattern)` pairs.
pub fn validators(pairs: &[(&str, &str)]) -> BTreeMap<String, Regex> {
    pairs
        .iter()
        .map(|(k, p)| (k.to_string(), Regex::new(p).expect("test validator pattern")))
        .collect()
}
