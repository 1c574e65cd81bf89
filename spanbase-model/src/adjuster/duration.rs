use chrono::TimeDelta;

use crate::adjuster::Adjuster;
use crate::span::Trace;

/// Clamps negative span durations to zero.
///
/// Durations arrive signed from legacy clients whose clocks ran backwards
/// between span start and finish. The span is kept; the clamp is recorded
/// as a trace warning.
#[derive(Clone, Copy, Debug)]
pub struct ClampDuration;

impl Adjuster for ClampDuration {
    fn adjust(&self, trace: &mut Trace) {
        let mut warnings = Vec::new();
        for span in &mut trace.spans {
            if span.duration < TimeDelta::zero() {
                warnings.push(format!(
                    "clamped negative duration of span {} to zero",
                    span.span_id
                ));
                span.duration = TimeDelta::zero();
            }
        }
        trace.warnings.append(&mut warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SpanId, TraceId};
    use crate::span::{Process, Span};
    use chrono::{TimeZone, Utc};

    fn span_with_duration(duration: TimeDelta) -> Span {
        Span {
            trace_id: TraceId::new(0, 1),
            span_id: SpanId::new(9),
            operation_name: "op".into(),
            references: vec![],
            flags: 0,
            start_time: Utc.with_ymd_and_hms(2017, 1, 26, 0, 0, 0).unwrap(),
            duration,
            tags: vec![],
            logs: vec![],
            process: Process::new("svc", vec![]),
        }
    }

    #[test]
    fn negative_duration_clamps_with_warning() {
        let mut trace = Trace::new(vec![span_with_duration(TimeDelta::microseconds(-5))]);
        ClampDuration.adjust(&mut trace);

        assert_eq!(trace.spans[0].duration, TimeDelta::zero());
        assert_eq!(trace.warnings.len(), 1);
        assert!(trace.warnings[0].contains("negative duration"));
    }

    #[test]
    fn positive_duration_is_untouched() {
        let mut trace = Trace::new(vec![span_with_duration(TimeDelta::microseconds(10))]);
        ClampDuration.adjust(&mut trace);

        assert_eq!(trace.spans[0].duration, TimeDelta::microseconds(10));
        assert!(trace.warnings.is_empty());
    }
}
