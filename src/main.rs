// src/main.rs

use servant::{cli, load_config, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("servant error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let cfg = load_config(&args)?;
    logging::init_logging(args.log_level, cfg.server.log.as_deref())?;
    run(args, cfg).await
}
