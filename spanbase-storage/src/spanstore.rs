//! The span reader/writer contract and the query parameter model.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use spanbase_model::{Span, SpanKind, TagValue, Trace, TraceId};

use crate::error::{Result, StorageError};

/// Default cap on the number of traces a query returns.
pub const DEFAULT_NUM_TRACES: usize = 20;

/// An operation name as stored per service, with the span kind when the
/// backend records it. Legacy backends report `span_kind: None`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_kind: Option<SpanKind>,
}

/// Filter for [`SpanReader::get_operations`].
#[derive(Clone, Debug, Default)]
pub struct OperationQueryParameters {
    pub service_name: String,
    /// When set, only operations of this kind are returned.
    pub span_kind: Option<SpanKind>,
}

impl OperationQueryParameters {
    pub fn for_service(service_name: impl Into<String>) -> Self {
        OperationQueryParameters {
            service_name: service_name.into(),
            span_kind: None,
        }
    }
}

fn default_num_traces() -> usize {
    DEFAULT_NUM_TRACES
}

/// A high-level trace query.
///
/// `service_name` and the start-time window are mandatory; everything else
/// narrows the match. See [`span_matches`] for the matching semantics.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceQueryParameters {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Tag equality predicates, matched with typed equality against span
    /// and process tags.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, TagValue>,
    pub start_time_min: DateTime<Utc>,
    pub start_time_max: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "spanbase_model::timestamps::opt_duration_us"
    )]
    pub duration_min: Option<TimeDelta>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "spanbase_model::timestamps::opt_duration_us"
    )]
    pub duration_max: Option<TimeDelta>,
    /// Caps returned traces, not spans. Defaults to [`DEFAULT_NUM_TRACES`].
    #[serde(default = "default_num_traces")]
    pub num_traces: usize,
}

impl TraceQueryParameters {
    /// A query over the given service and time window with defaults
    /// everywhere else.
    pub fn new(
        service_name: impl Into<String>,
        start_time_min: DateTime<Utc>,
        start_time_max: DateTime<Utc>,
    ) -> Self {
        TraceQueryParameters {
            service_name: service_name.into(),
            operation_name: None,
            tags: HashMap::new(),
            start_time_min,
            start_time_max,
            duration_min: None,
            duration_max: None,
            num_traces: DEFAULT_NUM_TRACES,
        }
    }

    /// Rejects malformed queries. Violations come back as
    /// [`StorageError::InvalidQuery`], unmodified for the caller.
    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(StorageError::InvalidQuery(
                "service name must not be empty".into(),
            ));
        }
        if self.start_time_min > self.start_time_max {
            return Err(StorageError::InvalidQuery(
                "start time min must not be after start time max".into(),
            ));
        }
        if let (Some(min), Some(max)) = (self.duration_min, self.duration_max) {
            if min > max {
                return Err(StorageError::InvalidQuery(
                    "duration min must not exceed duration max".into(),
                ));
            }
        }
        if self.num_traces == 0 {
            return Err(StorageError::InvalidQuery(
                "num traces must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Whether a single span satisfies every predicate of the query.
pub fn span_matches(span: &Span, query: &TraceQueryParameters) -> bool {
    if span.process.service_name != query.service_name {
        return false;
    }
    if let Some(operation) = &query.operation_name {
        if &span.operation_name != operation {
            return false;
        }
    }
    if span.start_time < query.start_time_min || span.start_time > query.start_time_max {
        return false;
    }
    if let Some(min) = query.duration_min {
        if span.duration < min {
            return false;
        }
    }
    if let Some(max) = query.duration_max {
        if span.duration > max {
            return false;
        }
    }
    query.tags.iter().all(|(key, value)| {
        span.tags
            .iter()
            .chain(span.process.tags.iter())
            .any(|kv| &kv.key == key && &kv.value == value)
    })
}

/// Whether at least one span of the trace matches all query predicates.
pub fn trace_matches(trace: &Trace, query: &TraceQueryParameters) -> bool {
    trace.spans.iter().any(|span| span_matches(span, query))
}

fn most_recent_start(trace: &Trace) -> DateTime<Utc> {
    trace
        .spans
        .iter()
        .map(|span| span.start_time)
        .max()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn trace_id_of(trace: &Trace) -> TraceId {
    trace
        .spans
        .first()
        .map(|span| span.trace_id)
        .unwrap_or(TraceId::ZERO)
}

/// Orders traces by their most recent span start, descending, breaking
/// ties by trace id ascending, then truncates to the query cap. The order
/// is deterministic across backends.
pub fn sort_and_limit(traces: &mut Vec<Trace>, num_traces: usize) {
    traces.sort_by(|a, b| {
        most_recent_start(b)
            .cmp(&most_recent_start(a))
            .then_with(|| trace_id_of(a).cmp(&trace_id_of(b)))
    });
    traces.truncate(num_traces);
}

/// Write half of the span contract.
///
/// Implementations must tolerate concurrent callers. Persistent backends
/// must be durable before returning success; in-memory backends may buffer
/// up to an implementation-defined bound.
#[async_trait]
pub trait SpanWriter: Send + Sync + Debug {
    async fn write_span(&self, span: &Span) -> Result<()>;
}

/// Read half of the span contract.
///
/// Write-then-immediate-read is not guaranteed; callers tolerate a bounded
/// visibility lag (asynchronous indexers flush on their own schedule).
#[async_trait]
pub trait SpanReader: Send + Sync + Debug {
    /// All spans recorded under the trace id.
    /// Returns [`StorageError::TraceNotFound`] when zero spans exist.
    async fn get_trace(&self, trace_id: TraceId) -> Result<Trace>;

    /// Distinct service names, deduplicated and unordered; callers sort.
    async fn get_services(&self) -> Result<Vec<String>>;

    /// Operations of a service, deduplicated on (name, span kind).
    async fn get_operations(&self, query: &OperationQueryParameters) -> Result<Vec<Operation>>;

    /// Traces with at least one span matching every query predicate.
    async fn find_traces(&self, query: &TraceQueryParameters) -> Result<Vec<Trace>>;

    /// Projection of [`SpanReader::find_traces`] for paging.
    async fn find_trace_ids(&self, query: &TraceQueryParameters) -> Result<Vec<TraceId>>;
}
