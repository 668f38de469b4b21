//! CSV bulk import for historical metric data.
//!
//! Rows flow through the same validation and persistence writer as live
//! ingestion, so imported data lands with a layout identical to the live
//! path. Malformed rows are logged and skipped, never fatal to the import;
//! only a store outage aborts it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::MetricRecord;
use crate::writer::PersistenceWriter;

// ---

/// Expected header line of an import file.
pub const CSV_HEADER: &str = "building_id,timestamp,co2_kg,energy_kwh,water_m3,waste_kg";

/// Totals for one import run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows stored by the writer.
    pub stored: usize,
    /// Rows rejected while parsing the file.
    pub skipped_parse: usize,
    /// Rows the writer skipped (range or store-level constraints).
    pub skipped_write: usize,
}

/// Parse one data line: the persisted column order, timestamps RFC 3339.
fn parse_line(line: &str) -> Result<MetricRecord, PipelineError> {
    // ---
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(PipelineError::validation(format!(
            "expected 6 fields, got {}",
            fields.len()
        )));
    }

    let timestamp = fields[1].parse::<DateTime<Utc>>().map_err(|e| {
        PipelineError::validation(format!("bad timestamp {:?}: {e}", fields[1]))
    })?;
    let quantity = |idx: usize, name: &str| -> Result<f64, PipelineError> {
        fields[idx]
            .parse::<f64>()
            .map_err(|e| PipelineError::validation(format!("bad {name} {:?}: {e}", fields[idx])))
    };

    Ok(MetricRecord {
        building_id: fields[0].to_string(),
        timestamp,
        co2_kg: quantity(2, "co2_kg")?,
        energy_kwh: quantity(3, "energy_kwh")?,
        water_m3: quantity(4, "water_m3")?,
        waste_kg: quantity(5, "waste_kg")?,
    })
}

/// Import a CSV file in `batch_size` chunks through `writer`.
pub async fn import_csv(
    path: &Path,
    writer: &PersistenceWriter,
    batch_size: usize,
) -> Result<ImportSummary> {
    // ---
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| anyhow!("empty import file"))?;
    if header.trim() != CSV_HEADER {
        bail!("unexpected header {:?}, want {:?}", header.trim(), CSV_HEADER);
    }

    let mut summary = ImportSummary::default();
    let mut batch: Vec<MetricRecord> = Vec::with_capacity(batch_size);
    let mut line_no = 1usize;

    for line in lines {
        let line = line?;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(record) => batch.push(record),
            Err(err) => {
                warn!(line = line_no, "skipping row: {err}");
                summary.skipped_parse += 1;
                continue;
            }
        }
        if batch.len() >= batch_size {
            flush_batch(writer, &mut batch, &mut summary).await?;
        }
    }
    flush_batch(writer, &mut batch, &mut summary).await?;

    info!(
        stored = summary.stored,
        skipped_parse = summary.skipped_parse,
        skipped_write = summary.skipped_write,
        "import finished"
    );
    Ok(summary)
}

async fn flush_batch(
    writer: &PersistenceWriter,
    batch: &mut Vec<MetricRecord>,
    summary: &mut ImportSummary,
) -> Result<()> {
    // ---
    if batch.is_empty() {
        return Ok(());
    }
    let report = writer.write(batch).await?;
    summary.stored += report.stored;
    summary.skipped_write += report.skipped.len();
    for skipped in &report.skipped {
        warn!(
            building_id = %skipped.record.building_id,
            reason = %skipped.reason,
            "writer skipped row"
        );
    }
    batch.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_line_round_trips_layout() {
        // ---
        let record =
            parse_line("bld-001,2024-06-01T12:00:00Z,1200.5,5000,200,150").unwrap();
        assert_eq!(record.building_id, "bld-001");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(record.co2_kg, 1200.5);
        assert_eq!(record.energy_kwh, 5000.0);
        assert_eq!(record.water_m3, 200.0);
        assert_eq!(record.waste_kg, 150.0);
    }

    #[test]
    fn test_parse_line_rejects_malformed_rows() {
        // ---
        // Wrong field count
        assert!(parse_line("bld-001,2024-06-01T12:00:00Z,1,2,3").is_err());
        // Unparseable timestamp
        assert!(parse_line("bld-001,yesterday,1,2,3,4").is_err());
        // Unparseable quantity
        assert!(parse_line("bld-001,2024-06-01T12:00:00Z,a lot,2,3,4").is_err());
    }
}
