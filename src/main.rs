//! Chameleon CLI

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use chameleon::config::{Config, Overrides};
use chameleon::network::NetworkHandler;
use chameleon::stats::StoreStats;
use chameleon::storage::RecordStore;
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("Chameleon v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: chameleon <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  serve [--config <file>] [--port <port>] [--backend <url>]");
    eprintln!("                         Start the proxy (mode from MODE or config file)");
    eprintln!("  stats <recording-dir>  Summarize stored recordings");
    eprintln!();
    eprintln!("Environment: MODE, BACKEND_URL, PORT, STORAGE_PATH, RUST_LOG");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let Some(command) = args.get(1) else {
        usage();
        process::exit(1);
    };

    let result = match command.as_str() {
        "serve" => serve(&args[2..]),
        "stats" => match args.get(2) {
            Some(dir) => show_stats(PathBuf::from(dir)),
            None => {
                eprintln!("Usage: chameleon stats <recording-dir>");
                process::exit(1);
            }
        },
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'chameleon' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn serve(args: &[String]) -> anyhow::Result<()> {
    let mut config_file = None;
    let mut overrides = Overrides::default();

    let mut args = args.iter();
    while let Some(flag) = args.next() {
        let value = args
            .next()
            .with_context(|| format!("missing value for {flag}"))?;
        match flag.as_str() {
            "--config" => config_file = Some(PathBuf::from(value)),
            "--port" => {
                overrides.port = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid port: {value}"))?,
                );
            }
            "--backend" => overrides.backend = Some(value.clone()),
            _ => bail!("unknown option: {flag}"),
        }
    }

    let config = Config::load(config_file.as_deref(), &overrides).context("invalid configuration")?;

    tracing::info!(
        "Mode: {} | Backend: {} | Storage: {}",
        config.mode,
        config.backend_url,
        config.storage_dir.display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async {
        let handler = NetworkHandler::new(&config).context("failed to start proxy")?;
        handler.run().await.context("server failed")
    })
}

fn show_stats(dir: PathBuf) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }

    let store = RecordStore::open(&dir)?;
    let stats = StoreStats::collect(&store)?;

    println!("Recording directory: {}", dir.display());
    println!();
    print!("{stats}");
    Ok(())
}
