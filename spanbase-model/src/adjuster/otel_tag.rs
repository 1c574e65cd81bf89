use crate::adjuster::Adjuster;
use crate::keyvalue::sort_by_key;
use crate::span::{Span, Trace};

/// Tag keys written by instrumentation SDKs that describe the emitting
/// library rather than the operation. They belong on the process.
pub const TELEMETRY_LIBRARY_KEYS: [&str; 5] = [
    "telemetry.sdk.language",
    "telemetry.sdk.name",
    "telemetry.sdk.version",
    "telemetry.distro.name",
    "telemetry.distro.version",
];

/// Relocates telemetry-SDK tags from span level to process level.
///
/// Kept span tags preserve their original relative order; promoted tags are
/// appended to the process tags, which are then stably re-sorted by key.
/// Running the adjuster twice yields the same trace.
#[derive(Clone, Copy, Debug)]
pub struct OtelTagAdjuster;

fn adjust_span_tags(span: &mut Span) {
    let mut kept = Vec::with_capacity(span.tags.len());
    for tag in span.tags.drain(..) {
        if TELEMETRY_LIBRARY_KEYS.contains(&tag.key.as_str()) {
            span.process.tags.push(tag);
        } else {
            kept.push(tag);
        }
    }
    span.tags = kept;
}

impl Adjuster for OtelTagAdjuster {
    fn adjust(&self, trace: &mut Trace) {
        for span in &mut trace.spans {
            adjust_span_tags(span);
            sort_by_key(&mut span.process.tags);
        }
    }
}
