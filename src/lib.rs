// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod lock;
pub mod logging;
pub mod supervisor;
pub mod types;
pub mod vars;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_all, ConfigFile};
use crate::engine::Engine;
use crate::errors::ServantError;
use crate::exec::InputStream;
use crate::supervisor::{run_daemon, run_timer, ShutdownCoordinator};
use crate::vars::RequestParams;

/// Load and validate every config source named on the command line.
pub fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let cfg = load_all(&args.config_files(), &args.confdir)?;
    Ok(cfg)
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - the engine and its variable store (config vars, `--var`, environment)
/// - either a single `--run` invocation, or
/// - daemon + timer supervision with signal-driven shutdown
pub async fn run(args: CliArgs, cfg: ConfigFile) -> Result<()> {
    let engine = Arc::new(Engine::from_config(&cfg));
    let args_seeded = engine.vars().seed_args(&args.var);
    let env_seeded = engine.vars().seed_env();
    debug!(args_seeded, env_seeded, "variables seeded");

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    if let Some(target) = args.run.as_deref() {
        return run_once(&engine, &cfg, target, &args).await;
    }

    serve(engine, cfg).await
}

/// Execute one configured command, streaming its output to stdout.
async fn run_once(engine: &Engine, cfg: &ConfigFile, target: &str, args: &CliArgs) -> Result<()> {
    let spec = target
        .split_once('.')
        .and_then(|(group, name)| cfg.command(group, name))
        .ok_or_else(|| ServantError::CommandNotFound(target.to_string()))?;

    let params = RequestParams::from_pairs(&args.param);
    let resolver = engine.resolver(Some(&params));
    let input = args.stdin.then(stdin_stream);

    let mut out = tokio::io::stdout();
    engine.execute_to(spec, &resolver, input, &mut out).await?;
    Ok(())
}

fn stdin_stream() -> InputStream {
    Box::new(tokio::io::stdin())
}

/// Start every daemon and timer, then run until a termination signal.
async fn serve(engine: Arc<Engine>, cfg: ConfigFile) -> Result<()> {
    let coordinator = Arc::new(ShutdownCoordinator::new(Arc::clone(engine.processes())));
    coordinator.install()?;

    for (name, spec) in cfg.daemons {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let exit = run_daemon(name.clone(), spec, engine).await;
            info!(daemon = %name, ?exit, "daemon stopped");
        });
    }

    for (name, spec) in cfg.timers {
        tokio::spawn(run_timer(name, spec, Arc::clone(&engine)));
    }

    info!("servant running; waiting for a termination signal");
    std::future::pending::<()>().await;
    Ok(())
}

/// Simple dry-run output: print server settings, vars, commands, timers
/// and daemons.
fn print_dry_run(cfg: &ConfigFile) {
    println!("servant dry-run");
    println!("  server.shell = {}", cfg.server.effective_shell());
    println!(
        "  server.work_dir = {}",
        cfg.server.effective_work_dir().display()
    );
    if let Some(ref log) = cfg.server.log {
        println!("  server.log = {}", log.display());
    }
    println!();

    println!("vars ({}):", cfg.vars.len());
    for (key, decl) in cfg.vars.iter() {
        println!("  - {key} = {:?}", decl.value);
        if decl.policy.readonly {
            println!("      readonly: true");
        }
        if decl.expandable {
            println!("      expand: true");
        }
    }

    let total: usize = cfg.commands.values().map(|g| g.len()).sum();
    println!("commands ({total}):");
    for (group, commands) in cfg.commands.iter() {
        for (name, spec) in commands.iter() {
            println!("  - {group}.{name}");
            println!("      lang: {}", spec.language);
            println!("      code: {}", spec.code);
            if let Some(timeout) = spec.timeout {
                println!("      timeout: {timeout:?}");
            }
            if let Some(ref user) = spec.run_as {
                println!("      runas: {user}");
            }
            if spec.background {
                println!("      background: true");
            }
            if let Some(ref lock) = spec.lock {
                println!(
                    "      lock: {} ({:?}, timeout {:?})",
                    lock.name, lock.wait_mode, lock.timeout
                );
            }
            if !spec.validators.is_empty() {
                let names: Vec<&str> = spec.validators.keys().map(String::as_str).collect();
                println!("      validate: {names:?}");
            }
        }
    }

    println!("timers ({}):", cfg.timers.len());
    for (name, spec) in cfg.timers.iter() {
        println!("  - {name}: every {:?}", spec.tick);
        println!("      code: {}", spec.code);
        if let Some(deadline) = spec.deadline {
            println!("      deadline: {deadline:?}");
        }
    }

    println!("daemons ({}):", cfg.daemons.len());
    for (name, spec) in cfg.daemons.iter() {
        println!("  - {name}: retries {}", spec.retries);
        println!("      code: {}", spec.code);
        if let Some(live) = spec.live {
            println!("      live: {live:?}");
        }
    }

    debug!("dry-run complete (no execution)");
}
