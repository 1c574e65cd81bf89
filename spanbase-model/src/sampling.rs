use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Per-service, per-operation sampling probabilities in `[0, 1]`.
///
/// A snapshot of this map is written wholesale by the recomputer; readers
/// always observe exactly one snapshot, never a merge of several.
pub type ServiceOperationProbabilities = HashMap<String, HashMap<String, f64>>;

/// Per-service, per-operation observed queries-per-second, `>= 0`.
pub type ServiceOperationQps = HashMap<String, HashMap<String, f64>>;

/// Count of traces seen for one (service, operation) pair within a bucket,
/// along with the distinct probabilities clients reported using.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throughput {
    pub service: String,
    pub operation: String,
    pub count: u64,
    #[serde(default)]
    pub probabilities: BTreeSet<String>,
}

impl Throughput {
    pub fn new(service: impl Into<String>, operation: impl Into<String>, count: u64) -> Self {
        Throughput {
            service: service.into(),
            operation: operation.into(),
            count,
            probabilities: BTreeSet::new(),
        }
    }
}
