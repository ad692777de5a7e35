// tests/variables.rs
mod common;
use crate::common::init_tracing;

use std::error::Error;

use regex::Regex;

use servant::config::{ConfigFile, RawConfigFile};
use servant::engine::Engine;
use servant::errors::VarError;
use servant::vars::{VarPolicy, VariableStore, MAX_VAR_VALUE_SIZE};

type TestResult = Result<(), Box<dyn Error>>;

fn digits_policy() -> Result<VarPolicy, regex::Error> {
    Ok(VarPolicy {
        readonly: false,
        patterns: vec![Regex::new("^[0-9]+$")?],
    })
}

#[test]
fn seeding_arguments_skips_malformed_pairs() {
    init_tracing();

    let store = VariableStore::new();
    let accepted = store.seed_args(["a=1", "no_equals", "1x=2", "b=x=y", "_u=3", "c="]);

    assert_eq!(accepted, 3);
    assert_eq!(store.get("_arg.a").as_deref(), Some("1"));
    assert_eq!(store.get("_arg.b").as_deref(), Some("x=y"));
    assert_eq!(store.get("_arg.c").as_deref(), Some(""));
    assert!(!store.contains("_arg.1x"));
    assert!(!store.contains("_arg._u"));
    assert!(!store.contains("_arg.no_equals"));
}

#[test]
fn seeding_environment_imports_process_vars() {
    let store = VariableStore::new();
    assert!(store.seed_env() > 0 || std::env::vars().next().is_none());

    if let Ok(path) = std::env::var("PATH") {
        assert_eq!(store.get("_env.PATH"), Some(path));
    }
    let entry = store.entry("_env.PATH");
    assert!(entry.is_none_or(|v| !v.expandable));
}

#[test]
fn checked_writes_follow_policy() -> TestResult {
    let store = VariableStore::new();
    store.declare("app.port", "8080", false, digits_policy()?);

    store.write_checked("app.port", "9090")?;
    assert_eq!(store.get("app.port").as_deref(), Some("9090"));

    assert_eq!(
        store.write_checked("app.port", "http"),
        Err(VarError::PatternMismatch("app.port".into()))
    );
    assert_eq!(store.get("app.port").as_deref(), Some("9090"));
    Ok(())
}

#[test]
fn checked_writes_reject_undeclared_readonly_and_unpatterned() {
    let store = VariableStore::new();
    store.set("loose.value", "x", false);
    store.declare(
        "app.home",
        "/srv",
        false,
        VarPolicy {
            readonly: true,
            patterns: vec![],
        },
    );
    store.declare("app.free", "a", false, VarPolicy::default());

    assert_eq!(
        store.write_checked("loose.value", "y"),
        Err(VarError::NotFound("loose.value".into()))
    );
    assert_eq!(
        store.write_checked("app.home", "/tmp"),
        Err(VarError::ReadOnly("app.home".into()))
    );
    // No patterns means nothing is accepted.
    assert_eq!(
        store.write_checked("app.free", "b"),
        Err(VarError::PatternMismatch("app.free".into()))
    );
    assert_eq!(store.get("app.home").as_deref(), Some("/srv"));
}

#[test]
fn checked_writes_reject_oversized_values() -> TestResult {
    let store = VariableStore::new();
    store.declare(
        "app.blob",
        "",
        false,
        VarPolicy {
            readonly: false,
            patterns: vec![Regex::new(".*")?],
        },
    );

    let max = "x".repeat(MAX_VAR_VALUE_SIZE);
    store.write_checked("app.blob", &max)?;

    let too_big = "x".repeat(MAX_VAR_VALUE_SIZE + 1);
    assert!(matches!(
        store.write_checked("app.blob", &too_big),
        Err(VarError::TooLarge { len, max, .. }) if len == MAX_VAR_VALUE_SIZE + 1 && max == MAX_VAR_VALUE_SIZE
    ));
    Ok(())
}

#[test]
fn checked_writes_keep_the_expandable_flag() -> TestResult {
    let store = VariableStore::new();
    store.declare(
        "app.path",
        "${app.base}",
        true,
        VarPolicy {
            readonly: false,
            patterns: vec![Regex::new("^\\$\\{")?],
        },
    );

    store.write_checked("app.path", "${app.other}")?;
    let entry = store.entry("app.path").ok_or("app.path missing")?;
    assert!(entry.expandable);
    assert_eq!(entry.value, "${app.other}");
    Ok(())
}

#[test]
fn engine_declares_config_vars() -> TestResult {
    let raw: RawConfigFile = toml::from_str(
        r#"
        [vars.app]
        mode = { value = "prod", patterns = ["^(prod|staging)$"] }
        home = { value = "/srv/app", readonly = true }
        "#,
    )?;
    let cfg = ConfigFile::try_from(raw)?;
    let engine = Engine::from_config(&cfg);

    assert_eq!(engine.get_variable("app.mode").as_deref(), Some("prod"));
    engine.write_variable("app", "mode", "staging")?;
    assert_eq!(engine.get_variable("app.mode").as_deref(), Some("staging"));

    assert_eq!(
        engine.write_variable("app", "mode", "dev"),
        Err(VarError::PatternMismatch("app.mode".into()))
    );
    assert_eq!(
        engine.write_variable("app", "home", "/tmp"),
        Err(VarError::ReadOnly("app.home".into()))
    );
    assert_eq!(
        engine.write_variable("app", "nope", "x"),
        Err(VarError::NotFound("app.nope".into()))
    );

    engine.set_variable("runtime.flag", "on", false);
    assert_eq!(engine.get_variable("runtime.flag").as_deref(), Some("on"));
    assert_eq!(engine.vars().snapshot().len(), 3);
    Ok(())
}
