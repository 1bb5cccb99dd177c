use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use listing_watcher::config::LoggingConfig;
use listing_watcher::{
    AppConfig, BatchHandle, ExecuteOptions, Marketplace, ScrapingEngine, ScrapingTask,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "listing-watcher", version)]
#[command(about = "Re-check marketplace listings with a headless browser")]
struct Cli {
    /// Config file to use instead of config/ and the environment
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch from a JSON array of tasks
    Run {
        #[arg(short, long)]
        input: PathBuf,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Check a single listing
    Check {
        url: String,

        #[arg(long, default_value = "generic")]
        marketplace: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::from_env(),
    }
    .context("Failed to load configuration")?;

    let _log_guard = init_tracing(&config.logging)?;
    info!("Starting listing watcher...");

    let engine = Arc::new(ScrapingEngine::from_config(&config));
    let outcome = match cli.command {
        Commands::Run {
            input,
            output,
            concurrency,
        } => run_batch(&engine, input, output, concurrency).await,
        Commands::Check { url, marketplace } => check_listing(&engine, url, marketplace).await,
    };

    if let Err(e) = engine.close().await {
        warn!("Failed to close browser: {}", e);
    }
    info!("Shutting down...");

    outcome
}

async fn run_batch(
    engine: &Arc<ScrapingEngine>,
    input: PathBuf,
    output: Option<PathBuf>,
    concurrency: Option<usize>,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let tasks: Vec<ScrapingTask> =
        serde_json::from_str(&raw).context("Task file must be a JSON array of tasks")?;

    let BatchHandle {
        mut progress,
        cancel,
        join,
    } = engine.spawn_batch(tasks, concurrency);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling batch");
            cancel.cancel();
        }
    });

    while let Some(event) = progress.recv().await {
        info!(
            position = event.position,
            total = event.total,
            task_id = %event.result.product_id,
            status = event.result.status.as_str(),
            success = event.result.success,
            "Progress"
        );
    }

    let report = join.await??;
    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", json),
    }

    Ok(())
}

async fn check_listing(engine: &ScrapingEngine, url: String, marketplace: String) -> Result<()> {
    let marketplace: Marketplace = marketplace.into();
    let task = ScrapingTask::new("check", url).with_marketplace(marketplace);

    let report = engine.execute(&[task], ExecuteOptions::default()).await?;
    for result in &report.results {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}

fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("listing_watcher={},headless_chrome=warn", config.level))
    });

    // stdout is reserved for reports
    let (plain, json) = if config.json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr).with_target(false)), None)
    };

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "listing-watcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain)
        .with(json)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(guard)
}
