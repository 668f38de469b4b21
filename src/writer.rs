//! Persistence writer: storage-level validation and durable batch writes.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::buffer::IngestionBatch;
use crate::error::PipelineError;
use crate::models::{MetricRecord, SkippedRecord, WriteReport};
use crate::store::{MetricStore, RowOutcome};
use crate::transport::RetryBackoff;

// ---

/// Writes batches to the durable store with row-level error isolation.
///
/// One bad row never fails a batch: it is skipped and reported in the
/// [`WriteReport`] while the rest proceeds. Only a store outage is an
/// error, and the caller decides whether to retry. Identical resubmissions
/// are not deduplicated here — each call creates new rows; layer a unique
/// constraint on top if that matters.
pub struct PersistenceWriter {
    store: Arc<dyn MetricStore>,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    /// Validate and store a batch, reporting per-record outcomes.
    ///
    /// Validation here is the storage-level pass (quantity ranges,
    /// building_id format); it catches records that arrived through paths
    /// other than the buffer's fail-fast check, such as bulk import.
    pub async fn write(&self, batch: &[MetricRecord]) -> Result<WriteReport, PipelineError> {
        // ---
        let mut report = WriteReport::default();
        let mut accepted: Vec<MetricRecord> = Vec::with_capacity(batch.len());

        for record in batch {
            match record.validate() {
                Ok(()) => accepted.push(record.clone()),
                Err(err) => report.skipped.push(SkippedRecord {
                    record: record.clone(),
                    reason: err.to_string(),
                }),
            }
        }

        if !accepted.is_empty() {
            let outcomes = self.store.insert_batch(&accepted).await?;
            for (record, outcome) in accepted.into_iter().zip(outcomes) {
                match outcome {
                    RowOutcome::Stored(_) => report.stored += 1,
                    RowOutcome::Skipped(reason) => {
                        report.skipped.push(SkippedRecord { record, reason })
                    }
                }
            }
        }

        Ok(report)
    }
}

/// Drain the batch queue, writing batches with bounded concurrency.
///
/// Up to `concurrency` batches are written at once (write-ahead
/// pipelining); no ordering between batches is promised beyond the store's
/// own transaction isolation. A batch that hits a store outage is retried
/// with backoff until it lands, giving at-least-once delivery from buffer
/// to store — while it retries, the queue fills and the buffer's
/// backpressure takes over admission control.
pub async fn run_write_worker(
    mut batch_rx: mpsc::Receiver<IngestionBatch>,
    writer: Arc<PersistenceWriter>,
    concurrency: usize,
    backoff: RetryBackoff,
) {
    // ---
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    while let Some(batch) = batch_rx.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let writer = Arc::clone(&writer);
        let backoff = backoff.clone();
        tokio::spawn(async move {
            let _permit = permit;
            write_with_retry(&writer, &batch, backoff).await;
        });
    }
    info!("write queue closed, write worker stopping");
}

async fn write_with_retry(
    writer: &PersistenceWriter,
    batch: &[MetricRecord],
    mut backoff: RetryBackoff,
) {
    // ---
    loop {
        match writer.write(batch).await {
            Ok(report) => {
                if report.skipped.is_empty() {
                    debug!(stored = report.stored, "batch written");
                } else {
                    warn!(
                        stored = report.stored,
                        skipped = report.skipped.len(),
                        "batch written with skipped rows"
                    );
                    for skipped in &report.skipped {
                        warn!(
                            building_id = %skipped.record.building_id,
                            timestamp = %skipped.record.timestamp,
                            reason = %skipped.reason,
                            "row skipped"
                        );
                    }
                }
                return;
            }
            Err(err) => {
                let delay = backoff.next_delay();
                error!(
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "store write failed, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
