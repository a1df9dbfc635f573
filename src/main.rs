use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use exhibition_ingest::config::Config;
use exhibition_ingest::db::{count_scraped_posts, Database};
use exhibition_ingest::orchestrator::run_all;
use exhibition_ingest::s3::S3Client;
use exhibition_ingest::sources::{build_adapters, load_sources_file, IngestContext, RunQuery};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting exhibition-ingest");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let sources = load_sources_file(&config.sources_path).context("Failed to load sources")?;
    let adapters = build_adapters(&sources.sources, &config).context("Invalid source definition")?;
    info!(
        path = %config.sources_path.display(),
        sources = adapters.len(),
        "Sources loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database initialized");

    let store = S3Client::new(&config).context("Failed to initialize S3 client")?;
    info!(bucket = %store.bucket_name(), "Object storage initialized");

    let ctx = IngestContext::new(&config, db.clone(), Arc::new(store))?;

    run_all(&ctx, &adapters, &RunQuery::default()).await;

    let total = count_scraped_posts(db.pool()).await?;
    info!(total_posts = total, "Done");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,exhibition_ingest=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
