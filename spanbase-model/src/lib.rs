//! Data model for the spanbase tracing backend.
//!
//! The model consists of a few main value types:
//!
//! * [`Span`] is a single unit of work recorded by an instrumented service,
//!   carrying an operation name, timing, typed tags, logs and the owning
//!   [`Process`].
//! * [`Trace`] is the collection of spans sharing one [`TraceId`].
//! * [`adjuster`] holds the pure post-processors applied to traces before
//!   storage and after retrieval so that every backend presents the same
//!   canonical shape.
//!
//! All types are immutable by convention: storage backends construct fresh
//! instances per query and callers never observe shared mutation.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms
)]

mod dependency;
mod ids;
mod keyvalue;
mod sampling;
mod span;
pub mod timestamps;

pub mod adjuster;

pub use dependency::{DependencyLink, DEPENDENCY_LINK_SOURCE};
pub use ids::{IdParseError, SpanId, TraceId};
pub use keyvalue::{sort_by_key, KeyValue, TagValue};
pub use sampling::{
    ServiceOperationProbabilities, ServiceOperationQps, Throughput,
};
pub use span::{Process, RefType, Span, SpanKind, SpanLog, SpanRef, Trace, SPAN_KIND_TAG};
