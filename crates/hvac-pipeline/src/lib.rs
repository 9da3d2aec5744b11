//! Telemetry aggregation and command validation for the HVAC MQTT bridge.
//!
//! Built on top of the plant model from `hvac-model`:
//!
//! - **aggregator**: buffers live samples per item and reduces every buffer
//!   to one value per aggregation window (median for numeric items, most
//!   recent value otherwise)
//! - **dispatch**: validates candidate command values against the model
//!   before the transport layer publishes them
//! - **config**: the pipeline knobs
//!
//! The pipeline never blocks on I/O; the transport and publication layers
//! sit on the other side of `ingest`, the broadcast channel and `validate`.

pub mod aggregator;
pub mod config;
pub mod dispatch;
pub mod reduce;

pub use aggregator::{CounterSnapshot, ReducedSample, TelemetryAggregator};
pub use config::PipelineConfig;
pub use dispatch::{validate_value, CommandValidator, ValidationError};
pub use reduce::{median, reduce, Sample};
