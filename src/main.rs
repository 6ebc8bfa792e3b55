use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikitimelines::app::build_orchestrator;
use wikitimelines::config::Config;
use wikitimelines::metrics;
use wikitimelines::server::TimelineServer;
use wikitimelines::RunOutcome;

#[derive(Parser)]
#[command(
    name = "wikitimelines",
    version,
    about = "Posts a random Wikipedia graphical timeline to Bluesky",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP routes and run the scheduled trigger
    Serve {
        /// Override the bind address
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Disable the scheduled trigger
        #[arg(long, default_value = "false")]
        no_schedule: bool,
    },

    /// Run the orchestrator once
    Post,

    /// Pick and download a timeline without posting
    Preview {
        /// Write the downloaded image to this path
        #[arg(short, long)]
        save: Option<PathBuf>,
    },

    /// List the filtered candidate titles
    Candidates {
        /// Print at most this many titles
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show whether a post is currently allowed
    Gate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wikitimelines starting");

    match cli.command {
        Commands::Serve { bind, no_schedule } => serve(config, bind, no_schedule).await?,
        Commands::Post => post(&config).await?,
        Commands::Preview { save } => preview(&config, save).await?,
        Commands::Candidates { limit } => candidates(&config, limit).await?,
        Commands::Gate => gate(&config).await?,
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { level };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("wikitimelines={level},warn")))
        .context("Invalid log level")?;

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

async fn serve(mut config: Config, bind: Option<SocketAddr>, no_schedule: bool) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    if no_schedule {
        config.schedule.enabled = false;
    }

    let orchestrator = Arc::new(build_orchestrator(&config).await?);
    let server = TimelineServer::new(config.server.clone(), &config.schedule, orchestrator);

    println!("{}", server.info().display());

    server.start_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn post(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    match orchestrator.run().await {
        Ok(RunOutcome::Posted(receipt)) => {
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            if !receipt.recorded {
                tracing::warn!("Post marker was not recorded");
            }
            Ok(())
        }
        Ok(RunOutcome::Suppressed) => {
            println!("already posted");
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Run failed")),
    }
}

async fn preview(config: &Config, save: Option<PathBuf>) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let report = orchestrator.preview().await.context("Preview failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(path) = save {
        tokio::fs::write(&path, &report.payload.bytes)
            .await
            .with_context(|| format!("Failed to write image to {}", path.display()))?;
        tracing::info!(path = %path.display(), size = report.image_bytes, "Image saved");
    }

    Ok(())
}

async fn candidates(config: &Config, limit: Option<usize>) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let titles = orchestrator
        .candidates()
        .await
        .context("Failed to list candidates")?;

    tracing::info!(count = titles.len(), "Candidates listed");
    for title in titles.iter().take(limit.unwrap_or(usize::MAX)) {
        println!("{title}");
    }

    Ok(())
}

async fn gate(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let status = orchestrator
        .gate_status()
        .await
        .context("Failed to read post gate")?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
