//! Contract for the adaptive sampling state store.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use spanbase_model::{ServiceOperationProbabilities, ServiceOperationQps, Throughput};

use crate::error::Result;

/// Stores throughput aggregates and probability snapshots for adaptive
/// sampling.
///
/// Invariants: probabilities lie in `[0, 1]` and QPS values are
/// non-negative. Snapshots are append-only per host and never merged: the
/// latest snapshot wins as a whole, so a service absent from the newest
/// snapshot is absent from the result even if an older snapshot knew it.
#[async_trait]
pub trait SamplingStore: Send + Sync + Debug {
    /// Appends throughput records. The store aggregates them into fixed
    /// width buckets (one minute in the bundled implementation).
    async fn insert_throughput(&self, throughput: Vec<Throughput>) -> Result<()>;

    /// Aggregated throughput rows whose bucket intersects `[start, end)`.
    async fn get_throughput(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Throughput>>;

    /// Records one probability/QPS snapshot for the given host. Snapshot
    /// timestamps are assigned by the store and are monotone per host.
    async fn insert_probabilities_and_qps(
        &self,
        hostname: &str,
        probabilities: ServiceOperationProbabilities,
        qps: ServiceOperationQps,
    ) -> Result<()>;

    /// The probabilities of the single most recent snapshot across all
    /// hosts. Ties on equal timestamps resolve to the later insertion,
    /// which is deterministic.
    async fn get_latest_probabilities(&self) -> Result<ServiceOperationProbabilities>;
}
