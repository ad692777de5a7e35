// tests/cli_args.rs

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use servant::cli::{CliArgs, LogLevel};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn defaults_to_servant_toml() -> TestResult {
    let args = CliArgs::try_parse_from(["servant"])?;
    assert_eq!(args.config_files(), vec![PathBuf::from("servant.toml")]);
    assert!(args.run.is_none());
    assert!(!args.dry_run);
    Ok(())
}

#[test]
fn confdir_alone_disables_the_default_file() -> TestResult {
    let args = CliArgs::try_parse_from(["servant", "--confdir", "/etc/servant.d"])?;
    assert!(args.config_files().is_empty());
    assert_eq!(args.confdir, vec![PathBuf::from("/etc/servant.d")]);
    Ok(())
}

#[test]
fn repeated_flags_accumulate() -> TestResult {
    let args = CliArgs::try_parse_from([
        "servant",
        "--conf",
        "a.toml",
        "--conf",
        "b.toml",
        "--var",
        "x=1",
        "--var",
        "y=2",
        "--log-level",
        "debug",
        "--run",
        "g.c",
        "--param",
        "name=bob",
        "--stdin",
    ])?;

    assert_eq!(
        args.config_files(),
        vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")]
    );
    assert_eq!(args.var, vec!["x=1", "y=2"]);
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert_eq!(args.run.as_deref(), Some("g.c"));
    assert_eq!(args.param, vec!["name=bob"]);
    assert!(args.stdin);
    Ok(())
}

#[test]
fn request_flags_need_run() {
    assert!(CliArgs::try_parse_from(["servant", "--param", "a=b"]).is_err());
    assert!(CliArgs::try_parse_from(["servant", "--stdin"]).is_err());
}
