use std::sync::Arc;

use axum::Router;

use crate::aggregate::AggregationEngine;
use crate::buffer::IngestionBuffer;
use crate::report::ReportGenerator;
use crate::store::MetricStore;

mod health;
mod metrics;
mod reports;

// ---

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub buffer: Arc<IngestionBuffer>,
    pub engine: AggregationEngine,
    pub reports: ReportGenerator,
    pub store: Arc<dyn MetricStore>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(metrics::router())
        .merge(reports::router())
        .merge(health::router())
        .with_state(state)
}
