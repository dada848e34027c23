//! Prediction verifier (swarm-verifier) - Main entry point
//!
//! `run` starts the worker pool against Postgres and the OpenRouter reasoning
//! service; `init-db` bootstraps the schema; `dedup-retroactive` runs the batch
//! duplicate pass over conversations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swarm_common::config::{load_toml_config, locate_config_file};
use swarm_common::db::{ensure_schema, init_pool};
use swarm_verifier::config::{
    CliOverrides, VerifierConfig, VerifierToml, CONFIG_ENV_VAR, CONFIG_FILE_NAME,
};
use swarm_verifier::reasoning::openrouter::OpenRouterClient;
use swarm_verifier::reasoning::ReasoningService;
use swarm_verifier::retroactive::RetroactiveDeduplicator;
use swarm_verifier::services::DuplicateDetector;
use swarm_verifier::stages::ReasoningStages;
use swarm_verifier::store::PgStore;
use swarm_verifier::workflow::{Orchestrator, Scheduler, StopPredicate};

/// Command-line arguments for swarm-verifier
#[derive(Parser, Debug)]
#[command(name = "swarm-verifier")]
#[command(about = "Prediction verification pipeline for the prediction swarm")]
#[command(version)]
struct Args {
    /// Path to swarm-verifier.toml
    #[arg(short, long, global = true, env = "SWARM_VERIFIER_CONFIG")]
    config: Option<PathBuf>,

    /// Postgres connection URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the verification workers until interrupted
    Run {
        /// Number of concurrent workers
        #[arg(long, env = "SWARM_VERIFIER_CONCURRENCY")]
        concurrency: Option<usize>,
    },
    /// Create any missing tables
    InitDb,
    /// Mark duplicates across conversations processed before live deduplication
    DedupRetroactive,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = locate_config_file(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let toml_config: VerifierToml =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    let concurrency = match &args.command {
        Command::Run { concurrency } => *concurrency,
        _ => None,
    };
    let config = VerifierConfig::resolve(
        toml_config,
        CliOverrides {
            database_url: args.database_url.clone(),
            concurrency,
        },
    )
    .context("Invalid configuration")?;

    // Initialize tracing
    let default_filter = format!(
        "swarm_verifier={level},swarm_common={level}",
        level = config.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = &config_path {
        info!(path = %path.display(), "Using config file");
    }

    match args.command {
        Command::Run { .. } => run_workers(config).await,
        Command::InitDb => init_db(config).await,
        Command::DedupRetroactive => dedup_retroactive(config).await,
    }
}

async fn run_workers(config: VerifierConfig) -> Result<()> {
    let api_key = config.require_api_key()?.to_string();
    let (timeframe, filter, verdict) = config
        .stage_configs()
        .context("Failed to load system prompts")?;

    let pool = init_pool(&config.database_url, config.scheduler.concurrency)
        .await
        .context("Failed to connect to database")?;

    let client = OpenRouterClient::new(
        api_key,
        config.openrouter_base_url.clone(),
        config.temperature,
        config.request_timeout,
    )
    .context("Failed to build OpenRouter client")?;
    let service: Arc<dyn ReasoningService> = Arc::new(client);

    let stages = ReasoningStages::new(service, timeframe, filter, verdict);
    let orchestrator = Arc::new(Orchestrator::new(stages, config.pipeline));
    let scheduler = Scheduler::new(Arc::new(PgStore::new(pool)), orchestrator, config.scheduler);

    info!(
        concurrency = config.scheduler.concurrency,
        timeframe_model = %config.models.timeframe,
        filter_model = %config.models.filter_validation,
        verdict_model = %config.models.verdict,
        "Starting swarm-verifier"
    );

    let token = shutdown_token();
    let stop_token = token.clone();
    let stop: StopPredicate = Arc::new(move || stop_token.is_cancelled());

    let stats = scheduler.run(stop).await;
    info!(
        processed = stats.processed,
        failures = stats.failures,
        "swarm-verifier shut down"
    );
    Ok(())
}

async fn init_db(config: VerifierConfig) -> Result<()> {
    let pool = init_pool(&config.database_url, 1)
        .await
        .context("Failed to connect to database")?;
    ensure_schema(&pool)
        .await
        .context("Failed to create schema")?;
    info!("Database schema ready");
    Ok(())
}

async fn dedup_retroactive(config: VerifierConfig) -> Result<()> {
    let pool = init_pool(&config.database_url, 1)
        .await
        .context("Failed to connect to database")?;

    let token = shutdown_token();
    let deduplicator =
        RetroactiveDeduplicator::new(pool, DuplicateDetector::new(config.pipeline.thresholds));
    let stats = deduplicator
        .run(|| token.is_cancelled())
        .await
        .context("Retroactive deduplication failed")?;

    println!("{}", stats);
    Ok(())
}

/// Token cancelled on the first Ctrl+C or SIGTERM
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signalled = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested, finishing in-flight work");
        signalled.cancel();
    });
    token
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
