//! Trace adjusters.
//!
//! An adjuster is a deterministic post-processor over a [`Trace`] applied on
//! the read path (so every backend presents the same canonical shape) and
//! selectively on the write path for idempotent normalizations. Adjusters
//! never fail and never drop spans; per-span anomalies are recorded as
//! warnings on the trace.
//!
//! Adjusters registered on an [`AdjusterPipeline`] run in registration
//! order, and running the whole pipeline twice yields the same trace as
//! running it once.

mod duration;
mod hostname;
mod logs;
mod otel_tag;
mod parent_reference;

pub use duration::ClampDuration;
pub use hostname::{HostResolver, HostnameTags, TableResolver};
pub use logs::DedupeLogs;
pub use otel_tag::{OtelTagAdjuster, TELEMETRY_LIBRARY_KEYS};
pub use parent_reference::PreferChildOf;

use crate::span::Trace;

/// A pure transformation over a trace.
pub trait Adjuster: Send + Sync {
    fn adjust(&self, trace: &mut Trace);
}

/// Wraps a closure as an [`Adjuster`].
pub fn adjuster_fn<F>(f: F) -> impl Adjuster
where
    F: Fn(&mut Trace) + Send + Sync,
{
    struct FnAdjuster<F>(F);

    impl<F> Adjuster for FnAdjuster<F>
    where
        F: Fn(&mut Trace) + Send + Sync,
    {
        fn adjust(&self, trace: &mut Trace) {
            (self.0)(trace)
        }
    }

    FnAdjuster(f)
}

/// An ordered chain of adjusters applied by fold.
#[derive(Default)]
pub struct AdjusterPipeline {
    adjusters: Vec<Box<dyn Adjuster>>,
}

impl AdjusterPipeline {
    pub fn new() -> Self {
        AdjusterPipeline::default()
    }

    /// The pipeline every reader applies by default.
    pub fn standard() -> Self {
        AdjusterPipeline::new()
            .with(OtelTagAdjuster)
            .with(ClampDuration)
            .with(DedupeLogs)
            .with(PreferChildOf)
    }

    pub fn with(mut self, adjuster: impl Adjuster + 'static) -> Self {
        self.adjusters.push(Box::new(adjuster));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.adjusters.is_empty()
    }

    pub fn adjust(&self, trace: &mut Trace) {
        for adjuster in &self.adjusters {
            adjuster.adjust(trace);
        }
    }
}

impl std::fmt::Debug for AdjusterPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdjusterPipeline")
            .field("len", &self.adjusters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SpanId, TraceId};
    use crate::keyvalue::KeyValue;
    use crate::span::{Process, Span, SpanLog, Trace};
    use chrono::{TimeDelta, TimeZone, Utc};

    #[test]
    fn standard_pipeline_is_idempotent() {
        let ts = Utc.with_ymd_and_hms(2017, 1, 26, 16, 46, 31).unwrap();
        let log = SpanLog {
            timestamp: ts,
            fields: vec![KeyValue::string("event", "retry")],
        };
        let mut trace = Trace::new(vec![Span {
            trace_id: TraceId::new(0, 1),
            span_id: SpanId::new(1),
            operation_name: "op".into(),
            references: vec![],
            flags: 0,
            start_time: ts,
            duration: TimeDelta::microseconds(-3),
            tags: vec![
                KeyValue::string("telemetry.sdk.version", "1.2"),
                KeyValue::string("http.method", "GET"),
            ],
            logs: vec![log.clone(), log],
            process: Process::new("svc", vec![KeyValue::string("zone", "b")]),
        }]);

        let pipeline = AdjusterPipeline::standard();
        pipeline.adjust(&mut trace);
        let once = trace.clone();
        pipeline.adjust(&mut trace);
        assert_eq!(trace, once);

        // canonical shape: no library tags on the span, sorted process
        // tags, clamped duration, deduped logs, one warning
        let span = &once.spans[0];
        assert_eq!(span.tags, vec![KeyValue::string("http.method", "GET")]);
        assert_eq!(
            span.process.tags,
            vec![
                KeyValue::string("telemetry.sdk.version", "1.2"),
                KeyValue::string("zone", "b"),
            ]
        );
        assert_eq!(span.duration, TimeDelta::zero());
        assert_eq!(span.logs.len(), 1);
        assert_eq!(once.warnings.len(), 1);
    }

    #[test]
    fn pipeline_applies_in_registration_order() {
        let pipeline = AdjusterPipeline::new()
            .with(adjuster_fn(|trace: &mut Trace| {
                trace.warnings.push("first".into())
            }))
            .with(adjuster_fn(|trace: &mut Trace| {
                trace.warnings.push("second".into())
            }));

        let mut trace = Trace::default();
        pipeline.adjust(&mut trace);
        assert_eq!(trace.warnings, vec!["first", "second"]);
    }
}
