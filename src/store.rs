//! Durable store boundary for metric records.
//!
//! The pipeline asks very little of its store: a batch insert that reports
//! per-row outcomes, a range-filtered sum pushdown, and a small read for the
//! live API. Any backend satisfying [`MetricStore`] slots in behind the
//! writer and the aggregation engine. [`PgMetricStore`] is the production
//! backend; [`MemoryMetricStore`] is the in-memory fake used by tests and
//! adapter development.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Acquire, PgPool};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{MetricRecord, MetricSums, StoredMetric};

// ---

/// Per-row outcome of a batch insert.
#[derive(Debug)]
pub enum RowOutcome {
    /// Row landed; the store assigned this id.
    Stored(Uuid),
    /// Row refused by a storage-level constraint; the rest of the batch
    /// proceeds.
    Skipped(String),
}

#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Insert a batch, reporting one outcome per input row, in input order.
    ///
    /// An individual row failure (constraint violation, coercion) must not
    /// fail the call; only a store outage is an `Err`.
    async fn insert_batch(
        &self,
        records: &[MetricRecord],
    ) -> Result<Vec<RowOutcome>, PipelineError>;

    /// Sum all quantities for `building_id` over the closed interval
    /// `start <= timestamp <= end`. An empty window sums to zero.
    ///
    /// Implementations must not materialize the matching rows: either the
    /// backend computes the sums itself or they are accumulated streaming.
    async fn sum_range(
        &self,
        building_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricSums, PipelineError>;

    /// Most recent stored rows for a building, newest first.
    async fn latest(
        &self,
        building_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMetric>, PipelineError>;
}

// ---

/// PostgreSQL-backed store.
pub struct PgMetricStore {
    pool: PgPool,
}

impl PgMetricStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricStore for PgMetricStore {
    async fn insert_batch(
        &self,
        records: &[MetricRecord],
    ) -> Result<Vec<RowOutcome>, PipelineError> {
        // ---
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(PipelineError::store_unavailable)?;

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let id = Uuid::new_v4();

            // Nested transaction = savepoint: a bad row rolls back alone
            // while the surrounding batch transaction survives.
            let mut sp = tx
                .begin()
                .await
                .map_err(PipelineError::store_unavailable)?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO esg_metrics (
                    id, building_id, timestamp,
                    co2_kg, energy_kwh, water_m3, waste_kg
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(id)
            .bind(&record.building_id)
            .bind(record.timestamp)
            .bind(record.co2_kg)
            .bind(record.energy_kwh)
            .bind(record.water_m3)
            .bind(record.waste_kg)
            .execute(&mut *sp)
            .await;

            match inserted {
                Ok(_) => {
                    sp.commit()
                        .await
                        .map_err(PipelineError::store_unavailable)?;
                    outcomes.push(RowOutcome::Stored(id));
                }
                Err(sqlx::Error::Database(db_err)) => {
                    sp.rollback()
                        .await
                        .map_err(PipelineError::store_unavailable)?;
                    outcomes.push(RowOutcome::Skipped(db_err.message().to_string()));
                }
                Err(other) => return Err(PipelineError::store_unavailable(other)),
            }
        }

        tx.commit()
            .await
            .map_err(PipelineError::store_unavailable)?;
        Ok(outcomes)
    }

    async fn sum_range(
        &self,
        building_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricSums, PipelineError> {
        // ---
        // The database computes the sums; arbitrarily large windows never
        // stream rows back here.
        let row: (f64, f64, f64, f64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(co2_kg),     0) AS total_co2,
                COALESCE(SUM(energy_kwh), 0) AS total_energy,
                COALESCE(SUM(water_m3),   0) AS total_water,
                COALESCE(SUM(waste_kg),   0) AS total_waste
            FROM esg_metrics
            WHERE building_id = $1
              AND timestamp >= $2
              AND timestamp <= $3
            "#,
        )
        .bind(building_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(PipelineError::store_unavailable)?;

        Ok(MetricSums {
            co2_kg: row.0,
            energy_kwh: row.1,
            water_m3: row.2,
            waste_kg: row.3,
        })
    }

    async fn latest(
        &self,
        building_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMetric>, PipelineError> {
        // ---
        sqlx::query_as::<_, StoredMetric>(
            r#"
            SELECT id, building_id, timestamp, co2_kg, energy_kwh, water_m3, waste_kg
            FROM esg_metrics
            WHERE building_id = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(building_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::store_unavailable)
    }
}

// ---

/// In-memory store for tests and local development.
///
/// Honors the same contract as the Postgres backend, including the range
/// constraints on insert, plus a toggle that simulates a store outage.
#[derive(Default)]
pub struct MemoryMetricStore {
    rows: Mutex<Vec<StoredMetric>>,
    unavailable: AtomicBool,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate (or lift) a store outage.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn rows(&self) -> Vec<StoredMetric> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl MetricStore for MemoryMetricStore {
    async fn insert_batch(
        &self,
        records: &[MetricRecord],
    ) -> Result<Vec<RowOutcome>, PipelineError> {
        // ---
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::store_unavailable("simulated outage"));
        }

        let mut rows = self.rows.lock().await;
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            // Mirror the column CHECK constraints of the real schema.
            if let Err(err) = record.validate() {
                outcomes.push(RowOutcome::Skipped(err.to_string()));
                continue;
            }
            let id = Uuid::new_v4();
            rows.push(StoredMetric {
                id,
                building_id: record.building_id.clone(),
                timestamp: record.timestamp,
                co2_kg: record.co2_kg,
                energy_kwh: record.energy_kwh,
                water_m3: record.water_m3,
                waste_kg: record.waste_kg,
            });
            outcomes.push(RowOutcome::Stored(id));
        }
        Ok(outcomes)
    }

    async fn sum_range(
        &self,
        building_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MetricSums, PipelineError> {
        // ---
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::store_unavailable("simulated outage"));
        }

        let rows = self.rows.lock().await;
        let mut sums = MetricSums::default();
        for row in rows
            .iter()
            .filter(|r| r.building_id == building_id)
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
        {
            sums.co2_kg += row.co2_kg;
            sums.energy_kwh += row.energy_kwh;
            sums.water_m3 += row.water_m3;
            sums.waste_kg += row.waste_kg;
        }
        Ok(sums)
    }

    async fn latest(
        &self,
        building_id: &str,
        limit: i64,
    ) -> Result<Vec<StoredMetric>, PipelineError> {
        // ---
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::store_unavailable("simulated outage"));
        }

        let rows = self.rows.lock().await;
        let mut matching: Vec<StoredMetric> = rows
            .iter()
            .filter(|r| r.building_id == building_id)
            .cloned()
            .collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.timestamp));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn record_at(hour: u32, co2: f64) -> MetricRecord {
        // ---
        MetricRecord {
            building_id: "bld-001".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
            co2_kg: co2,
            energy_kwh: 10.0,
            water_m3: 1.0,
            waste_kg: 0.5,
        }
    }

    #[tokio::test]
    async fn sum_range_bounds_are_inclusive() {
        // ---
        let store = MemoryMetricStore::new();
        store
            .insert_batch(&[record_at(10, 100.0), record_at(11, 200.0), record_at(12, 400.0)])
            .await
            .unwrap();

        // Window edges land exactly on the first and last timestamps
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let sums = store.sum_range("bld-001", start, end).await.unwrap();
        assert_eq!(sums.co2_kg, 700.0);

        // One second inside each edge drops the boundary rows
        let sums = store
            .sum_range(
                "bld-001",
                Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 1).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 1, 11, 59, 59).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(sums.co2_kg, 200.0);
    }

    #[tokio::test]
    async fn sum_range_empty_window_is_zero() {
        // ---
        let store = MemoryMetricStore::new();
        let sums = store
            .sum_range(
                "bld-404",
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(sums, MetricSums::default());
    }

    #[tokio::test]
    async fn insert_batch_skips_constraint_violations_row_by_row() {
        // ---
        let store = MemoryMetricStore::new();
        let outcomes = store
            .insert_batch(&[record_at(10, 100.0), record_at(11, -1.0), record_at(12, 200.0)])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], RowOutcome::Stored(_)));
        assert!(matches!(outcomes[1], RowOutcome::Skipped(_)));
        assert!(matches!(outcomes[2], RowOutcome::Stored(_)));
        assert_eq!(store.row_count().await, 2);
    }

    #[tokio::test]
    async fn outage_is_an_error_not_a_skip() {
        // ---
        let store = MemoryMetricStore::new();
        store.set_available(false);

        let err = store.insert_batch(&[record_at(10, 100.0)]).await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreUnavailable(_)));

        store.set_available(true);
        assert_eq!(store.row_count().await, 0);
    }

    #[tokio::test]
    async fn latest_is_newest_first_and_limited() {
        // ---
        let store = MemoryMetricStore::new();
        store
            .insert_batch(&[record_at(8, 1.0), record_at(12, 3.0), record_at(10, 2.0)])
            .await
            .unwrap();

        let rows = store.latest("bld-001", 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].co2_kg, 3.0);
        assert_eq!(rows[1].co2_kg, 2.0);

        assert!(store.latest("bld-other", 10).await.unwrap().is_empty());
    }
}
