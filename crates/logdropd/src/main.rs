//! logdrop Daemon - HTTP ingestion and log aggregation

use anyhow::{Context, Result};
use clap::Parser;
use logdrop_core::Config;
use logdrop_store::LogQuery;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod daemon;

use cli::{Cli, Commands, CountArgs};
use daemon::{Daemon, Roles};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "logdropd={0},logdrop_collector={0},logdrop_store={0},logdrop_web={0},tower_http=warn",
                    log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(&cli)?;
    let command = cli.command.unwrap_or(Commands::Run);

    match command {
        Commands::Run => {
            info!("logdrop daemon starting...");
            let daemon = Daemon::new(config)?;
            daemon.run(Roles::ALL, shutdown_signal()).await?;
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let daemon = Daemon::new(config)?;
            daemon
                .run(
                    Roles {
                        serve: true,
                        collect: false,
                    },
                    shutdown_signal(),
                )
                .await?;
        }
        Commands::Collect { workers, once } => {
            if let Some(workers) = workers {
                config.collector.workers = workers;
                config.validate()?;
            }
            let daemon = Daemon::new(config)?;
            if once {
                let appended = daemon.collect_once()?;
                info!("Appended {} messages", appended);
            } else {
                daemon
                    .run(
                        Roles {
                            serve: false,
                            collect: true,
                        },
                        shutdown_signal(),
                    )
                    .await?;
            }
        }
        Commands::Count(args) => return count(&config, &args),
    }

    info!("Daemon shutdown complete");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir()?;
            let (config, path) = Config::find_and_load(&cwd)?;
            if let Some(path) = path {
                info!("Loaded config from {}", path.display());
            }
            config
        }
    };
    if let Some(root) = &cli.root {
        config.root = Some(root.clone());
    }
    Ok(config)
}

fn count(config: &Config, args: &CountArgs) -> Result<()> {
    let query = LogQuery::from_path(&args.query_path())?;
    let log_dir = config.paths().log_dir;
    if args.lines {
        for line in query.lines(&log_dir)? {
            println!("{}", line);
        }
    } else {
        println!("{}", query.count(&log_dir)?);
    }
    Ok(())
}

/// Resolve on the first SIGTERM or SIGINT
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to install signal handlers: {}", e);
            // Fall back to Ctrl-C only
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
    }
}
