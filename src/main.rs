//! Application entry point for the `esgflow` backend service.
//!
//! This binary orchestrates the full startup sequence for the ESG telemetry
//! pipeline, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool
//! - Creating the database schema if it does not exist
//! - Wiring the ingestion pipeline (buffer -> batch queue -> write worker)
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `INGEST_BATCH_SIZE`, `INGEST_FLUSH_INTERVAL_MS`, `INGEST_MAX_PENDING`,
//!   `INGEST_QUEUE_DEPTH`, `WRITE_CONCURRENCY` (optional) – pipeline sizing
//! - `ESG_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `ESG_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, io::IsTerminal, net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

use esgflow::routes::{self, AppState};
use esgflow::transport::RetryBackoff;
use esgflow::{
    config, schema, writer, AggregationEngine, IngestionBuffer, MetricStore, PersistenceWriter,
    PgMetricStore, ReportGenerator,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database: {}", cfg.db_url);

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(&cfg.db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database '{}': {}", cfg.db_url, e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    // Pipeline wiring: buffer -> bounded batch queue -> write worker
    let store: Arc<dyn MetricStore> = Arc::new(PgMetricStore::new(pool));
    let (batch_tx, batch_rx) = mpsc::channel(cfg.queue_depth as usize);

    let buffer = IngestionBuffer::new(cfg.buffer_config(), batch_tx);
    tokio::spawn(Arc::clone(&buffer).run_flush_timer());

    let persistence = Arc::new(PersistenceWriter::new(Arc::clone(&store)));
    tokio::spawn(writer::run_write_worker(
        batch_rx,
        persistence,
        cfg.write_concurrency as usize,
        RetryBackoff::new(Duration::from_millis(500), Duration::from_secs(30)),
    ));

    let engine = AggregationEngine::new(Arc::clone(&store));
    let reports = ReportGenerator::new(engine.clone());

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(AppState {
        buffer,
        engine,
        reports,
        store,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `ESG_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `ESG_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("ESG_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to ESG_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("ESG_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
