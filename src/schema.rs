//! Database schema management for `esgflow`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `esg_metrics` table holding one row per sensor sample. The
/// CHECK constraints are the storage-level backstop behind the writer's own
/// validation; a row violating them is reported as an individual skip, not
/// a batch failure. Safe to call on every startup; no-op if objects already
/// exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS esg_metrics (
            id          UUID PRIMARY KEY,
            building_id TEXT             NOT NULL CHECK (length(building_id) BETWEEN 1 AND 64),
            timestamp   TIMESTAMPTZ      NOT NULL,
            co2_kg      DOUBLE PRECISION NOT NULL CHECK (co2_kg     >= 0),
            energy_kwh  DOUBLE PRECISION NOT NULL CHECK (energy_kwh >= 0),
            water_m3    DOUBLE PRECISION NOT NULL CHECK (water_m3   >= 0),
            waste_kg    DOUBLE PRECISION NOT NULL CHECK (waste_kg   >= 0)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Aggregation scans filter on building and time window together
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_esg_metrics_building_ts
            ON esg_metrics (building_id, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_esg_metrics_timestamp
            ON esg_metrics (timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
