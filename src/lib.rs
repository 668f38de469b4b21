//! Telemetry ingestion and aggregation backend for building ESG metrics.
//!
//! Data flow:
//!
//! ```text
//! transport adapter -> ingestion buffer -> persistence writer -> store
//!                      (batch, backpressure)   (validate + write)
//!                                                     |
//!                     report generator <- aggregation engine (on demand)
//! ```
//!
//! Module boundaries follow the Explicit Module Boundary Pattern (EMBP):
//! `routes` is the HTTP gateway, `store` is the durable-store boundary, and
//! sibling modules know each other only through the types re-exported here.

pub mod aggregate;
pub mod buffer;
pub mod config;
pub mod error;
pub mod import;
pub mod models;
pub mod report;
pub mod routes;
pub mod schema;
pub mod store;
pub mod transport;
pub mod writer;

pub use aggregate::AggregationEngine;
pub use buffer::{BufferConfig, IngestionBatch, IngestionBuffer};
pub use config::Config;
pub use error::PipelineError;
pub use models::{
    AggregateResult, MetricRecord, MetricSums, RawMetricReading, StoredMetric, WriteReport,
};
pub use report::{ReportFormat, ReportGenerator, ReportPayload};
pub use store::{MemoryMetricStore, MetricStore, PgMetricStore};
pub use writer::PersistenceWriter;
