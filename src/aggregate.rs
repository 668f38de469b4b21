//! On-demand aggregation over stored metrics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::PipelineError;
use crate::models::AggregateResult;
use crate::store::MetricStore;

// ---

/// Computes rollups for a building over a closed time window.
///
/// Thin by design: the store does the summing (SQL `SUM` pushdown in the
/// Postgres backend), so a window spanning millions of rows never
/// materializes here. Queries are read-only and safe to run while ingestion
/// continues; a write racing a query may or may not be visible in the
/// result — acceptable for reporting, there is no snapshot isolation. A
/// long-running query is cancelled by dropping the future, e.g. behind
/// `tokio::time::timeout`.
#[derive(Clone)]
pub struct AggregationEngine {
    store: Arc<dyn MetricStore>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    /// Sum all quantities for `building_id` where
    /// `start <= timestamp <= end` — inclusive on both ends.
    ///
    /// An empty window is not an error; it yields zero sums so callers can
    /// render "no data" instead of failing.
    pub async fn aggregate(
        &self,
        building_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<AggregateResult, PipelineError> {
        // ---
        if start > end {
            return Err(PipelineError::validation(format!(
                "window start {start} is after end {end}"
            )));
        }

        let totals = self.store.sum_range(building_id, start, end).await?;
        debug!(building_id, %start, %end, "aggregated window");

        Ok(AggregateResult {
            building_id: building_id.to_string(),
            start,
            end,
            totals,
        })
    }
}
