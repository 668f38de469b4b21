//! Metric submission and read endpoints.
//!
//! Deliberately thin over the core pipeline: handlers translate between
//! HTTP and the plain functions, and map core errors onto status codes.
//! Everything else (validation, batching, backpressure, aggregation) lives
//! in the core.

use axum::{
    extract::Path, extract::Query, extract::State, http::StatusCode, response::IntoResponse,
    routing::get, routing::post, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::PipelineError;
use crate::models::RawMetricReading;

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/esg/metrics", post(submit_metrics))
        .route("/esg/metrics/{building_id}", get(latest_metrics))
        .route("/esg/aggregate", get(aggregate))
}

/// One entry of a `POST /esg/metrics` body.
#[derive(Debug, Deserialize)]
struct MetricSubmission {
    building_id: String,
    #[serde(flatten)]
    reading: RawMetricReading,
}

#[derive(Debug, Serialize)]
struct RejectedSubmission {
    index: usize,
    reason: String,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    accepted: usize,
    rejected: Vec<RejectedSubmission>,
}

/// Handle `POST /esg/metrics`.
///
/// Accepts a JSON array of readings. Each entry is accepted or rejected
/// independently and the response says which, so a partially invalid
/// submission still reports its successes. Buffer saturation turns into
/// 503 only when nothing was accepted; otherwise callers retry just the
/// rejected indices.
async fn submit_metrics(
    State(state): State<AppState>,
    Json(body): Json<Vec<MetricSubmission>>,
) -> impl IntoResponse {
    // ---
    let total = body.len();
    let mut response = SubmitResponse {
        accepted: 0,
        rejected: Vec::new(),
    };
    let mut saturated = false;

    for (index, submission) in body.into_iter().enumerate() {
        let record = submission.reading.into_record(&submission.building_id);
        match state.buffer.submit(record).await {
            Ok(()) => response.accepted += 1,
            Err(err) => {
                if matches!(err, PipelineError::Backpressure) {
                    saturated = true;
                }
                response.rejected.push(RejectedSubmission {
                    index,
                    reason: err.to_string(),
                });
            }
        }
    }

    info!(
        total,
        accepted = response.accepted,
        rejected = response.rejected.len(),
        "metric submission"
    );

    let status = if saturated && response.accepted == 0 {
        StatusCode::SERVICE_UNAVAILABLE
    } else if response.accepted == 0 && total > 0 {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(response)).into_response()
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    limit: Option<u32>,
}

/// Handle `GET /esg/metrics/{building_id}` — recent rows, newest first.
async fn latest_metrics(
    Path(building_id): Path<String>,
    Query(params): Query<LatestQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // ---
    let limit = i64::from(params.limit.unwrap_or(100).min(1000));
    match state.store.latest(&building_id, limit).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => {
            error!("latest query failed: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, Json(err.to_string())).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AggregateQuery {
    building_id: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Handle `GET /esg/aggregate?building_id=&start=&end=`.
///
/// Window bounds are RFC 3339 and inclusive on both ends.
async fn aggregate(
    Query(params): Query<AggregateQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // ---
    match state
        .engine
        .aggregate(&params.building_id, params.start, params.end)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err @ PipelineError::Validation(_)) => {
            (StatusCode::BAD_REQUEST, Json(err.to_string())).into_response()
        }
        Err(err) => {
            error!("aggregate failed: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, Json(err.to_string())).into_response()
        }
    }
}
