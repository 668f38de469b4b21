//! Yearly report endpoint.

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::get, Json,
    Router,
};
use serde::Deserialize;
use tracing::error;

use crate::error::PipelineError;

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/esg/report", get(report))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    building_id: String,
    year: i32,
    format: Option<String>,
}

/// Handle `GET /esg/report?building_id=&year=&format=`.
///
/// A year with no data is a normal report with zero totals, not an error.
async fn report(
    Query(params): Query<ReportQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // ---
    let format = params.format.as_deref().unwrap_or("json");
    match state
        .reports
        .generate(&params.building_id, params.year, format)
        .await
    {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(err @ (PipelineError::UnsupportedFormat(_) | PipelineError::Validation(_))) => {
            (StatusCode::BAD_REQUEST, Json(err.to_string())).into_response()
        }
        Err(err) => {
            error!("report generation failed: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, Json(err.to_string())).into_response()
        }
    }
}
