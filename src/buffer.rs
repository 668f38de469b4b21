//! Ingestion buffer: accumulates validated records and flushes batches
//! downstream.
//!
//! Multiple producers (transport adapters, the HTTP surface, bulk import)
//! share one buffer. The pending batch lives behind a single mutex, so two
//! producers can never trigger a flush of overlapping content; a flush swaps
//! the whole batch out atomically while new submissions continue into a
//! fresh one. Handing a batch to the write worker goes through a bounded
//! queue, keeping buffering and writing decoupled: a slow or failing writer
//! never blocks `submit`, it only fills the queue and, eventually, the
//! buffer itself — at which point `submit` starts signalling backpressure
//! instead of dropping anything.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::models::MetricRecord;

// ---

/// A batch handed from the buffer to the write worker, in arrival order.
///
/// One ordered sequence for all producers: records of the same building
/// appear in the order they arrived, which downstream aggregation checks
/// rely on. No ordering is implied across buildings.
pub type IngestionBatch = Vec<MetricRecord>;

/// Sizing knobs for one [`IngestionBuffer`].
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Records per batch before a size-triggered flush.
    pub batch_size: usize,
    /// Max age of the oldest unflushed record before a time-triggered flush.
    pub flush_interval: Duration,
    /// Hard cap on buffered records; `submit` rejects past this.
    pub max_pending: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        // ---
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
            max_pending: 10_000,
        }
    }
}

struct BufferState {
    pending: Vec<MetricRecord>,
    /// When the oldest unflushed record arrived; `None` while empty.
    opened_at: Option<Instant>,
}

/// Shared accumulation point between sample producers and the write worker.
pub struct IngestionBuffer {
    config: BufferConfig,
    state: Mutex<BufferState>,
    batch_tx: mpsc::Sender<IngestionBatch>,
    batch_opened: Notify,
}

impl IngestionBuffer {
    /// Build a buffer feeding batches into `batch_tx`.
    ///
    /// Callers that want time-triggered flushes must also spawn
    /// [`run_flush_timer`](Self::run_flush_timer).
    pub fn new(config: BufferConfig, batch_tx: mpsc::Sender<IngestionBatch>) -> Arc<Self> {
        // ---
        Arc::new(Self {
            config,
            state: Mutex::new(BufferState {
                pending: Vec::new(),
                opened_at: None,
            }),
            batch_tx,
            batch_opened: Notify::new(),
        })
    }

    /// Validate and enqueue one record.
    ///
    /// Malformed records are rejected here, before they occupy any buffer
    /// capacity. A full buffer yields [`PipelineError::Backpressure`] so the
    /// caller can retry or shed load at the source — records are never
    /// silently dropped.
    pub async fn submit(&self, record: MetricRecord) -> Result<(), PipelineError> {
        // ---
        record.validate()?;

        let mut state = self.state.lock().await;
        if state.pending.len() >= self.config.max_pending {
            return Err(PipelineError::Backpressure);
        }

        state.pending.push(record);
        if state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
            self.batch_opened.notify_one();
        }
        if state.pending.len() >= self.config.batch_size {
            self.flush_locked(&mut state);
        }
        Ok(())
    }

    /// Number of records currently held and not yet handed off.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Flush whatever is pending, regardless of batch size or age.
    pub async fn flush_now(&self) {
        // ---
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state);
    }

    /// Swap the pending batch out and hand it downstream. Caller holds the
    /// state lock.
    ///
    /// If the batch queue is full (writer down or backlogged) the records
    /// are put back and the flush clock re-arms, so the handoff is retried
    /// one interval later while `submit` keeps accumulating toward
    /// `max_pending`.
    fn flush_locked(&self, state: &mut BufferState) {
        // ---
        if state.pending.is_empty() {
            return;
        }
        state.opened_at = None;
        let batch = mem::take(&mut state.pending);
        let size = batch.len();

        match self.batch_tx.try_send(batch) {
            Ok(()) => debug!(records = size, "flushed batch to write queue"),
            Err(mpsc::error::TrySendError::Full(batch)) => {
                warn!(held = size, "write queue full, holding records in buffer");
                state.pending = batch;
                state.opened_at = Some(Instant::now());
            }
            Err(mpsc::error::TrySendError::Closed(batch)) => {
                warn!(held = size, "write queue closed, holding records in buffer");
                state.pending = batch;
                state.opened_at = Some(Instant::now());
            }
        }
    }

    /// Debounced time-triggered flush loop.
    ///
    /// Arms when a batch opens and fires once the oldest record reaches
    /// `flush_interval` — independent of `submit` calls, so a quiet source
    /// still gets its partial batch flushed. The deadline is per batch, not
    /// rescheduled per record.
    pub async fn run_flush_timer(self: Arc<Self>) {
        // ---
        loop {
            let deadline = {
                let state = self.state.lock().await;
                state.opened_at.map(|t| t + self.config.flush_interval)
            };

            match deadline {
                None => self.batch_opened.notified().await,
                Some(deadline) if Instant::now() >= deadline => {
                    let mut state = self.state.lock().await;
                    // Re-check under the lock: a size-triggered flush may
                    // have beaten the timer.
                    let due = state
                        .opened_at
                        .is_some_and(|t| t.elapsed() >= self.config.flush_interval);
                    if due {
                        self.flush_locked(&mut state);
                    }
                }
                Some(deadline) => tokio::time::sleep_until(deadline).await,
            }
        }
    }
}
