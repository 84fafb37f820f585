use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tessera::config::Config;
use tessera::db::{Database, DatabaseBackend, LibSqlBackend};
use tessera::intelligence::{ExtractionCapability, LlmExtractionCapability};
use tessera::llm::LlmProvider;
use tessera::models::TagCategory;
use tessera::services::{InsightEngine, NoteWatcher, SynthesisRefreshManager};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Therapeutic insight synthesis engine")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tag new notes and keep cached syntheses fresh until interrupted
    Run,
    /// Print the journey synthesis for a client and date range
    Synthesize {
        #[arg(long)]
        client: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Ignore the cached document
        #[arg(long)]
        force: bool,
    },
    /// Search a client's tags and insights
    Recall {
        #[arg(long)]
        client: String,
        query: String,
    },
    /// Print a client's tags
    Tags {
        #[arg(long)]
        client: String,
        #[arg(long, value_parser = parse_category)]
        category: Option<TagCategory>,
    },
    /// Print a client's insights
    Insights {
        #[arg(long)]
        client: String,
    },
}

fn parse_category(value: &str) -> Result<TagCategory, String> {
    value.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();

    tracing::info!("Initializing database...");
    let raw_db = Database::new(&config.database).await?;
    let db: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(raw_db));
    db.sync().await?;

    if let Some(llm_config) = &config.llm {
        tracing::info!("Initializing LLM provider: {}...", llm_config.model);
    }
    let llm = LlmProvider::new(config.llm.as_ref());
    if !llm.is_available() {
        tracing::warn!("LLM unavailable - notes will be flagged tagging_failed until one is configured");
    }
    let extractor: Arc<dyn ExtractionCapability> = Arc::new(LlmExtractionCapability::new(llm));

    let cancel_token = CancellationToken::new();
    let (engine, dispatcher) = InsightEngine::start(
        db.clone(),
        extractor,
        &config,
        cancel_token.child_token(),
    );

    match args.command {
        Command::Run => run(db, engine, &config, cancel_token.clone()).await,
        Command::Synthesize {
            client,
            from,
            to,
            force,
        } => print_json(&engine.synthesize(&client, from, to, force).await?),
        Command::Recall { client, query } => print_json(&engine.recall(&client, &query).await?),
        Command::Tags { client, category } => {
            print_json(&engine.get_tags(&client, category).await?)
        }
        Command::Insights { client } => print_json(&engine.get_insights(&client).await?),
    }?;

    cancel_token.cancel();
    dispatcher.await?;

    Ok(())
}

async fn run(
    db: Arc<dyn DatabaseBackend>,
    engine: InsightEngine,
    config: &Config,
    cancel_token: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(
        "Starting note watcher... (interval={}s, batch={})",
        config.watcher.poll_interval_secs,
        config.watcher.batch_size
    );
    let watcher = NoteWatcher::new(
        db.clone(),
        engine.queue().clone(),
        &config.watcher,
        config.tagging.retry_failed_after_secs,
    );
    let token = cancel_token.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Note watcher shutting down...");
                    break;
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(watcher.interval_secs())) => {
                    if let Err(e) = watcher.run_once().await {
                        tracing::error!("Note watcher error: {}", e);
                    }
                }
            }
        }
    });

    tracing::info!(
        "Starting synthesis refresh manager... (interval={}s)",
        config.synthesis.refresh_interval_secs
    );
    let refresh = SynthesisRefreshManager::new(
        db,
        engine.synthesizer().clone(),
        config.synthesis.refresh_interval_secs,
    );
    let token = cancel_token.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Synthesis refresh manager shutting down...");
                    break;
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(refresh.interval_secs())) => {
                    if let Err(e) = refresh.run_once().await {
                        tracing::error!("Synthesis refresh error: {}", e);
                    }
                }
            }
        }
    });

    tracing::info!("Tessera running, press Ctrl+C to stop");
    shutdown_signal(cancel_token).await;

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling background tasks...");
    cancel_token.cancel();
}
