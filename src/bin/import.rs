//! `esg-import` — bulk-load historical metric CSVs into the store.
//!
//! Usage: `esg-import <file.csv> [batch-size]`
//!
//! Reads `DATABASE_URL` (and the usual knobs) from the environment or
//! `.env`, then streams the file through the same persistence writer as
//! live ingestion. Malformed rows are skipped and logged; the exit status
//! reflects only infrastructure failures.
use std::{env, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;

use esgflow::{config, import, schema, PersistenceWriter, PgMetricStore};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();
    dotenv().ok();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: esg-import <file.csv> [batch-size]");
    };
    let batch_size = match args.next() {
        Some(value) => value
            .parse::<usize>()
            .with_context(|| format!("invalid batch size {value:?}"))?,
        None => 100,
    };

    let cfg = config::load_from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database '{}': {}", cfg.db_url, e))?;
    schema::create_schema(&pool).await?;

    let writer = PersistenceWriter::new(Arc::new(PgMetricStore::new(pool)));
    let summary = import::import_csv(&PathBuf::from(path), &writer, batch_size).await?;

    println!(
        "stored {} rows ({} skipped at parse, {} skipped by writer)",
        summary.stored, summary.skipped_parse, summary.skipped_write
    );
    Ok(())
}
