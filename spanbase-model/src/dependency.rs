use serde::{Deserialize, Serialize};

/// Provenance value stamped on dependency links derived by this backend.
pub const DEPENDENCY_LINK_SOURCE: &str = "spanbase";

/// An aggregated caller/callee edge between two services.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyLink {
    pub parent: String,
    pub child: String,
    pub call_count: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

impl DependencyLink {
    pub fn new(parent: impl Into<String>, child: impl Into<String>, call_count: u64) -> Self {
        DependencyLink {
            parent: parent.into(),
            child: child.into(),
            call_count,
            source: DEPENDENCY_LINK_SOURCE.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_links_carry_the_canonical_source() {
        let link = DependencyLink::new("hello", "world", 1);
        assert_eq!(link.source, "spanbase");
        assert_eq!(link.call_count, 1);
    }

    #[test]
    fn empty_source_is_omitted_from_json() {
        let mut link = DependencyLink::new("a", "b", 2);
        link.source = String::new();
        let json = serde_json::to_string(&link).unwrap();
        assert_eq!(json, r#"{"parent":"a","child":"b","callCount":2}"#);
    }
}
