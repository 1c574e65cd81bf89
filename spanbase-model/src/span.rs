use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SpanId, TraceId};
use crate::keyvalue::KeyValue;

/// Tag key under which clients record the span kind.
pub const SPAN_KIND_TAG: &str = "span.kind";

/// The role a span plays in a request, mirroring the OpenTelemetry kinds.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    #[default]
    Unspecified,
    Server,
    Client,
    Producer,
    Consumer,
    Internal,
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpanKind::Unspecified => "unspecified",
            SpanKind::Server => "server",
            SpanKind::Client => "client",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
            SpanKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl FromStr for SpanKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(SpanKind::Unspecified),
            "server" => Ok(SpanKind::Server),
            "client" => Ok(SpanKind::Client),
            "producer" => Ok(SpanKind::Producer),
            "consumer" => Ok(SpanKind::Consumer),
            "internal" => Ok(SpanKind::Internal),
            _ => Err(()),
        }
    }
}

/// The kind of association a [`SpanRef`] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefType {
    ChildOf,
    FollowsFrom,
}

/// A reference from one span to another, usually its parent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRef {
    pub ref_type: RefType,
    #[serde(rename = "traceID")]
    pub trace_id: TraceId,
    #[serde(rename = "spanID")]
    pub span_id: SpanId,
}

/// The process that emitted a set of spans.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub service_name: String,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
}

impl Process {
    pub fn new(service_name: impl Into<String>, tags: Vec<KeyValue>) -> Self {
        Process {
            service_name: service_name.into(),
            tags,
        }
    }
}

/// A timestamped log event recorded while a span was active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanLog {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fields: Vec<KeyValue>,
}

/// A single unit of work within a trace.
///
/// Every span owns its [`Process`]; the process is never absent. Tags are
/// sorted lexicographically by key only after the adjuster pipeline has run,
/// so freshly ingested spans may carry them in client order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    #[serde(rename = "traceID")]
    pub trace_id: TraceId,
    #[serde(rename = "spanID")]
    pub span_id: SpanId,
    pub operation_name: String,
    #[serde(default)]
    pub references: Vec<SpanRef>,
    #[serde(default)]
    pub flags: u32,
    pub start_time: DateTime<Utc>,
    #[serde(with = "crate::timestamps::duration_us")]
    pub duration: TimeDelta,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
    #[serde(default)]
    pub logs: Vec<SpanLog>,
    pub process: Process,
}

impl Span {
    /// The service that emitted this span.
    pub fn service_name(&self) -> &str {
        &self.process.service_name
    }

    /// Looks up a tag by key among the span's own tags.
    pub fn tag(&self, key: &str) -> Option<&KeyValue> {
        self.tags.iter().find(|kv| kv.key == key)
    }

    /// The span kind recorded under the `span.kind` tag, if any.
    pub fn span_kind(&self) -> Option<SpanKind> {
        self.tag(SPAN_KIND_TAG)
            .and_then(|kv| kv.as_str())
            .and_then(|s| s.parse().ok())
    }
}

/// The collection of spans sharing one trace id.
///
/// Adjusters record per-span anomalies as human readable `warnings` instead
/// of failing; callers surface them alongside query results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub spans: Vec<Span>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Trace {
    pub fn new(spans: Vec<Span>) -> Self {
        Trace {
            spans,
            warnings: Vec::new(),
        }
    }
}
