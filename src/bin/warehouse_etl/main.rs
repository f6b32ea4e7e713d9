//! Warehouse batch orchestrator - runs extract, transform, load as one batch

use anyhow::{Context, Result};
use tourism_warehouse::warehouse::config::Config;
use tourism_warehouse::warehouse::store::{connect_with_retry, MemoryStore, PgStore, Store};
use tourism_warehouse::warehouse::{extract, transform, write, LoadStats, Table};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    info!("Starting warehouse batch");

    let config = Config::from_env()?;
    info!("Configuration loaded (data dir {:?})", config.data_dir);

    match run_batch(&config).await {
        Ok(stats) => {
            info!("✓ Batch complete: {}", stats);
            Ok(())
        }
        Err(e) => {
            error!("✗ Batch failed: {:#}", e);
            Err(e)
        }
    }
}

async fn run_batch(config: &Config) -> Result<LoadStats> {
    // Step 1: Extract raw tables
    info!("Step 1/3: Reading extracts...");
    let extracts = extract::read_extracts(
        &config.listings_file,
        &config.calendar_file,
        &config.tourism_file,
        &config.weather_file,
        config.monthly_file.as_deref(),
    )?;
    info!("✓ Extracts read");

    // Step 2: Conform dimensions and facts
    info!("Step 2/3: Transforming...");
    let output = transform::transform(&extracts, &config.transform_options())?;
    if output.report.is_clean() {
        info!("✓ Transform complete, no defects");
    } else {
        warn!("✓ Transform complete with defects: {}", output.report);
    }
    let tables = write::warehouse_tables(&output.warehouse);

    // Step 3: Load as one atomic batch
    info!("Step 3/3: Loading warehouse...");
    let stats = if config.dry_run {
        warn!("DRY_RUN set, loading into memory only");
        load(&MemoryStore::new(), tables).await?
    } else {
        let url = config
            .database_url
            .as_deref()
            .context("WAREHOUSE_DB_URL must be set")?;
        let pool = connect_with_retry(
            url,
            "warehouse_db",
            config.db_max_retries,
            config.db_retry_delay,
        )
        .await?;
        load(&PgStore::new(pool), tables).await?
    };
    info!("✓ Load complete");

    Ok(stats)
}

async fn load(store: &dyn Store, tables: Vec<Table>) -> Result<LoadStats> {
    Ok(write::load_batch(store, tables).await?)
}
