//! Configuration loader for the `esgflow` backend service.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). Components never read the environment
//! themselves: each one receives an explicit config struct (or handle)
//! derived from the immutable [`Config`] snapshot at construction, which
//! keeps unit tests free to build distinct configurations per test.

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::buffer::BufferConfig;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Records per batch before a size-triggered flush.
    pub batch_size: u32,

    /// Max age (ms) of the oldest unflushed record before a time-triggered
    /// flush.
    pub flush_interval_ms: u32,

    /// Hard cap on buffered records; submissions past this are rejected
    /// with a backpressure signal.
    pub max_pending: u32,

    /// Batches allowed in flight between buffer and write worker.
    pub queue_depth: u32,

    /// Concurrent store writes (write-ahead pipelining).
    pub write_concurrency: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `INGEST_BATCH_SIZE` – records per flushed batch (default: 100)
/// - `INGEST_FLUSH_INTERVAL_MS` – flush age for partial batches (default: 5000)
/// - `INGEST_MAX_PENDING` – buffered-record cap (default: 10000)
/// - `INGEST_QUEUE_DEPTH` – batches in flight (default: 8)
/// - `WRITE_CONCURRENCY` – concurrent store writes (default: 2)
///
/// Returns an error if any required variable is missing or a value is
/// invalid or inconsistent.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let batch_size = parse_env_u32!("INGEST_BATCH_SIZE", 100);
    let flush_interval_ms = parse_env_u32!("INGEST_FLUSH_INTERVAL_MS", 5000);
    let max_pending = parse_env_u32!("INGEST_MAX_PENDING", 10_000);
    let queue_depth = parse_env_u32!("INGEST_QUEUE_DEPTH", 8);
    let write_concurrency = parse_env_u32!("WRITE_CONCURRENCY", 2);

    if batch_size == 0 {
        return Err(anyhow!("INGEST_BATCH_SIZE must be at least 1"));
    }
    if max_pending < batch_size {
        return Err(anyhow!(
            "INGEST_MAX_PENDING ({max_pending}) must be >= INGEST_BATCH_SIZE ({batch_size})"
        ));
    }
    if queue_depth == 0 {
        return Err(anyhow!("INGEST_QUEUE_DEPTH must be at least 1"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        batch_size,
        flush_interval_ms,
        max_pending,
        queue_depth,
        write_concurrency,
    })
}

impl Config {
    /// Sizing knobs handed to the ingestion buffer at construction.
    pub fn buffer_config(&self) -> BufferConfig {
        // ---
        BufferConfig {
            batch_size: self.batch_size as usize,
            flush_interval: Duration::from_millis(u64::from(self.flush_interval_ms)),
            max_pending: self.max_pending as usize,
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL             : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX              : {}", self.db_pool_max);
        tracing::info!("  INGEST_BATCH_SIZE        : {}", self.batch_size);
        tracing::info!("  INGEST_FLUSH_INTERVAL_MS : {}", self.flush_interval_ms);
        tracing::info!("  INGEST_MAX_PENDING       : {}", self.max_pending);
        tracing::info!("  INGEST_QUEUE_DEPTH       : {}", self.queue_depth);
        tracing::info!("  WRITE_CONCURRENCY        : {}", self.write_concurrency);
    }
}
