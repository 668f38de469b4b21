//! Yearly report assembly over the aggregation engine.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::aggregate::AggregationEngine;
use crate::error::PipelineError;
use crate::models::MetricSums;

// ---

/// Version stamped into every payload so downstream consumers can detect
/// layout changes.
pub const REPORT_FORMAT_VERSION: &str = "1.0";

/// Report serialization formats.
///
/// PDF rendering lives in a separate service, so only JSON is produced
/// here; anything else fails fast, before any aggregation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
}

impl FromStr for ReportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // ---
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            other => Err(PipelineError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Structured yearly report for one building.
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    // ---
    pub building_id: String,
    pub report_year: i32,
    pub generated_at: DateTime<Utc>,
    pub format: ReportFormat,
    pub format_version: &'static str,
    pub totals: MetricSums,
}

/// Deliberately thin over the aggregation engine: computes the full-year
/// window, delegates, and attaches metadata.
#[derive(Clone)]
pub struct ReportGenerator {
    engine: AggregationEngine,
}

impl ReportGenerator {
    pub fn new(engine: AggregationEngine) -> Self {
        Self { engine }
    }

    /// Closed full-year window `[Jan 1 00:00:00, Dec 31 23:59:59]` UTC.
    pub fn year_window(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>), PipelineError> {
        // ---
        if !(1970..=9999).contains(&year) {
            return Err(PipelineError::validation(format!(
                "report year {year} out of range"
            )));
        }
        let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single();
        let end = Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).single();
        match (start, end) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(PipelineError::validation(format!(
                "report year {year} out of range"
            ))),
        }
    }

    /// Generate a yearly report.
    ///
    /// The format check runs first so an unsupported format costs nothing.
    /// A year with no records still yields a payload — with zero totals —
    /// so callers can render "no data" sections.
    pub async fn generate(
        &self,
        building_id: &str,
        year: i32,
        format: &str,
    ) -> Result<ReportPayload, PipelineError> {
        // ---
        let format: ReportFormat = format.parse()?;
        let (start, end) = Self::year_window(year)?;
        let aggregate = self.engine.aggregate(building_id, start, end).await?;

        Ok(ReportPayload {
            building_id: aggregate.building_id,
            report_year: year,
            generated_at: Utc::now(),
            format,
            format_version: REPORT_FORMAT_VERSION,
            totals: aggregate.totals,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_format_parsing() {
        // ---
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);

        for unsupported in ["pdf", "xlsx", ""] {
            let err = unsupported.parse::<ReportFormat>().unwrap_err();
            assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
        }
    }

    #[test]
    fn test_year_window_bounds() {
        // ---
        let (start, end) = ReportGenerator::year_window(2024).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_year_out_of_range() {
        // ---
        assert!(ReportGenerator::year_window(1969).is_err());
        assert!(ReportGenerator::year_window(10_000).is_err());
        assert!(ReportGenerator::year_window(1970).is_ok());
        assert!(ReportGenerator::year_window(9999).is_ok());
    }
}
