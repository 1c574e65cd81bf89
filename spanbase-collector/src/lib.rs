//! Write path of the spanbase tracing backend.
//!
//! Receivers hand canonical spans to a [`pipeline::SpanPipeline`], which
//! batches them behind a bounded queue and drains into any
//! [`spanbase_storage::spanstore::SpanWriter`]. Backpressure surfaces to
//! receivers as a retryable error instead of blocking them. Along the way
//! a [`throughput::ThroughputAccumulator`] counts traffic per (service,
//! operation) and periodically feeds the sampling store.
//!
//! The [`ingester`] module is the replay variant: it consumes encoded span
//! messages from a replayable log (a Kafka topic in production, an
//! in-process log in tests) and drives them through the same write path.
#![warn(future_incompatible, nonstandard_style, rust_2018_idioms)]

pub mod ingester;
pub mod pipeline;
pub mod throughput;

pub use pipeline::{PipelineError, SpanPipeline, SpanPipelineBuilder};
