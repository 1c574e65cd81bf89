use crate::adjuster::Adjuster;
use crate::span::Trace;

/// Removes identical adjacent log entries within each span.
///
/// Retried instrumentation frequently double-writes the same event; the
/// duplicates carry no information and inflate storage.
#[derive(Clone, Copy, Debug)]
pub struct DedupeLogs;

impl Adjuster for DedupeLogs {
    fn adjust(&self, trace: &mut Trace) {
        for span in &mut trace.spans {
            span.logs.dedup();
        }
    }
}
