//! Error taxonomy for the telemetry pipeline.
//!
//! Per-record problems (`Validation`) are captured next to the records they
//! belong to — in rejection replies and `WriteReport`s — rather than thrown
//! up the stack as batch failures. Only infrastructure-level failures
//! (`StoreUnavailable`) propagate as hard errors to the caller.

use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or out-of-range record. Rejected at the buffer or the
    /// writer; never fatal to the pipeline.
    #[error("invalid record: {0}")]
    Validation(String),

    /// The ingestion buffer is at capacity. The caller must retry or shed
    /// load at the source.
    #[error("ingestion buffer at capacity, retry later")]
    Backpressure,

    /// The durable store is unreachable. Fatal to the in-flight write call;
    /// the buffer keeps accumulating up to capacity in the meantime.
    #[error("metric store unavailable: {0}")]
    StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Report requested in a format this service cannot produce.
    #[error("unsupported report format: {0:?}")]
    UnsupportedFormat(String),

    /// Connection or decoding failure inside a transport adapter.
    #[error("transport error: {0}")]
    Transport(String),
}

impl PipelineError {
    // ---
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        PipelineError::Validation(msg.into())
    }

    pub fn transport<S: Into<String>>(msg: S) -> Self {
        PipelineError::Transport(msg.into())
    }

    pub fn store_unavailable<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        PipelineError::StoreUnavailable(err.into())
    }
}
