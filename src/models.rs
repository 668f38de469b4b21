//! Data models for the ESG telemetry pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

// ---

/// Longest accepted `building_id`, matching the store column constraint.
pub const MAX_BUILDING_ID_LEN: usize = 64;

/// Raw sample as published by a sensor source (MQTT payload, BACnet read).
///
/// The timestamp is optional: sources without a clock omit it and ingestion
/// time is used instead. `sensor_status` is diagnostic only and is never
/// persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMetricReading {
    // ---
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub co2_kg: f64,
    pub energy_kwh: f64,
    pub water_m3: f64,
    pub waste_kg: f64,
    #[serde(default)]
    pub sensor_status: Option<String>,
}

impl RawMetricReading {
    /// Attach a building and fill in the ingestion-time default timestamp.
    pub fn into_record(self, building_id: &str) -> MetricRecord {
        // ---
        MetricRecord {
            building_id: building_id.to_string(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            co2_kg: self.co2_kg,
            energy_kwh: self.energy_kwh,
            water_m3: self.water_m3,
            waste_kg: self.waste_kg,
        }
    }
}

/// One timestamped environmental sample for a building.
///
/// Immutable once persisted: there is no update path, corrections are new
/// records. The row id is assigned by the store at persistence time, so it
/// does not appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    // ---
    pub building_id: String,
    pub timestamp: DateTime<Utc>,
    pub co2_kg: f64,
    pub energy_kwh: f64,
    pub water_m3: f64,
    pub waste_kg: f64,
}

impl MetricRecord {
    /// Quantity fields by name, in persisted column order.
    pub fn quantities(&self) -> [(&'static str, f64); 4] {
        // ---
        [
            ("co2_kg", self.co2_kg),
            ("energy_kwh", self.energy_kwh),
            ("water_m3", self.water_m3),
            ("waste_kg", self.waste_kg),
        ]
    }

    /// Check the record invariants: a non-empty, bounded `building_id` and
    /// four finite, non-negative quantities. Violations are rejected
    /// outright, never clamped.
    pub fn validate(&self) -> Result<(), PipelineError> {
        // ---
        if self.building_id.is_empty() {
            return Err(PipelineError::validation("building_id must not be empty"));
        }
        if self.building_id.len() > MAX_BUILDING_ID_LEN {
            return Err(PipelineError::validation(format!(
                "building_id longer than {MAX_BUILDING_ID_LEN} bytes"
            )));
        }
        for (name, value) in self.quantities() {
            if !value.is_finite() {
                return Err(PipelineError::validation(format!(
                    "{name} is not a finite number"
                )));
            }
            if value < 0.0 {
                return Err(PipelineError::validation(format!(
                    "{name} is negative ({value})"
                )));
            }
        }
        Ok(())
    }
}

/// Stored row shape, as read back from the metric store.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredMetric {
    // ---
    pub id: Uuid,
    pub building_id: String,
    pub timestamp: DateTime<Utc>,
    pub co2_kg: f64,
    pub energy_kwh: f64,
    pub water_m3: f64,
    pub waste_kg: f64,
}

/// Summed quantities over some set of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSums {
    // ---
    pub co2_kg: f64,
    pub energy_kwh: f64,
    pub water_m3: f64,
    pub waste_kg: f64,
}

impl std::ops::Add for MetricSums {
    type Output = MetricSums;

    fn add(self, rhs: MetricSums) -> MetricSums {
        // ---
        MetricSums {
            co2_kg: self.co2_kg + rhs.co2_kg,
            energy_kwh: self.energy_kwh + rhs.energy_kwh,
            water_m3: self.water_m3 + rhs.water_m3,
            waste_kg: self.waste_kg + rhs.waste_kg,
        }
    }
}

/// Aggregate over a closed time window for one building.
///
/// Derived on demand, never persisted. An empty window yields zero sums,
/// not an absent result.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    // ---
    pub building_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub totals: MetricSums,
}

/// Outcome of writing one batch: how many rows were stored and which were
/// skipped, with reasons. Partial success is the designed behavior, not an
/// edge case.
#[derive(Debug, Default)]
pub struct WriteReport {
    // ---
    pub stored: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// A record the writer refused, paired with the reason.
#[derive(Debug)]
pub struct SkippedRecord {
    pub record: MetricRecord,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn create_test_record(co2: f64) -> MetricRecord {
        // ---
        MetricRecord {
            building_id: "bld-001".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 26, 18, 45, 0).unwrap(),
            co2_kg: co2,
            energy_kwh: 5000.0,
            water_m3: 200.0,
            waste_kg: 150.0,
        }
    }

    #[test]
    fn test_valid_record_passes() {
        // ---
        assert!(create_test_record(1200.5).validate().is_ok());

        // Zero is a legal quantity, only negatives are rejected
        assert!(create_test_record(0.0).validate().is_ok());
    }

    #[test]
    fn test_negative_quantity_rejected() {
        // ---
        let err = create_test_record(-5.0).validate().unwrap_err();
        assert!(err.to_string().contains("co2_kg"), "got: {err}");

        let mut record = create_test_record(100.0);
        record.waste_kg = -0.1;
        let err = record.validate().unwrap_err();
        assert!(err.to_string().contains("waste_kg"), "got: {err}");
    }

    #[test]
    fn test_non_finite_quantity_rejected() {
        // ---
        let mut record = create_test_record(100.0);
        record.energy_kwh = f64::NAN;
        assert!(record.validate().is_err());

        record.energy_kwh = f64::INFINITY;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_building_id_format() {
        // ---
        let mut record = create_test_record(100.0);
        record.building_id = String::new();
        assert!(record.validate().is_err());

        record.building_id = "b".repeat(MAX_BUILDING_ID_LEN + 1);
        assert!(record.validate().is_err());

        record.building_id = "b".repeat(MAX_BUILDING_ID_LEN);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_into_record_defaults_timestamp_to_now() {
        // ---
        let raw = RawMetricReading {
            timestamp: None,
            co2_kg: 800.0,
            energy_kwh: 2000.0,
            water_m3: 50.0,
            waste_kg: 50.0,
            sensor_status: Some("normal".to_string()),
        };

        let before = Utc::now();
        let record = raw.into_record("bld-002");
        let after = Utc::now();

        assert_eq!(record.building_id, "bld-002");
        assert!(record.timestamp >= before && record.timestamp <= after);
    }

    #[test]
    fn test_into_record_preserves_source_timestamp() {
        // ---
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 6, 30, 0).unwrap();
        let raw = RawMetricReading {
            timestamp: Some(ts),
            co2_kg: 800.0,
            energy_kwh: 2000.0,
            water_m3: 50.0,
            waste_kg: 50.0,
            sensor_status: None,
        };

        let record = raw.into_record("bld-001");
        assert_eq!(record.timestamp, ts);
        assert_eq!(record.co2_kg, 800.0);
    }

    #[test]
    fn test_sums_add_per_quantity() {
        // ---
        let a = MetricSums { co2_kg: 100.0, energy_kwh: 1.0, water_m3: 2.0, waste_kg: 3.0 };
        let b = MetricSums { co2_kg: 200.0, energy_kwh: 4.0, water_m3: 5.0, waste_kg: 6.0 };
        let sum = a + b;
        assert_eq!(sum.co2_kg, 300.0);
        assert_eq!(sum.energy_kwh, 5.0);
        assert_eq!(sum.water_m3, 7.0);
        assert_eq!(sum.waste_kg, 9.0);
    }
}
