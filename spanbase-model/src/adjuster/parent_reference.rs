use crate::adjuster::Adjuster;
use crate::span::{RefType, Trace};

/// Resolves ambiguous parent references.
///
/// When a span references the same target through both a `ChildOf` and a
/// `FollowsFrom` relation, the `ChildOf` reference wins and the redundant
/// `FollowsFrom` entries are dropped. Spans with a single reference are
/// untouched.
#[derive(Clone, Copy, Debug)]
pub struct PreferChildOf;

impl Adjuster for PreferChildOf {
    fn adjust(&self, trace: &mut Trace) {
        for span in &mut trace.spans {
            if span.references.len() < 2 {
                continue;
            }
            let child_targets: Vec<_> = span
                .references
                .iter()
                .filter(|r| r.ref_type == RefType::ChildOf)
                .map(|r| (r.trace_id, r.span_id))
                .collect();
            span.references.retain(|r| {
                r.ref_type == RefType::ChildOf
                    || !child_targets.contains(&(r.trace_id, r.span_id))
            });
        }
    }
}
