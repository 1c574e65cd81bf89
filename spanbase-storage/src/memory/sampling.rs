use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use spanbase_model::{ServiceOperationProbabilities, ServiceOperationQps, Throughput};

use crate::error::{Result, StorageError};
use crate::samplingstore::SamplingStore;

/// Width of a throughput aggregation bucket.
fn bucket_width() -> TimeDelta {
    TimeDelta::minutes(1)
}

#[derive(Debug)]
struct ProbabilitySnapshot {
    seq: u64,
    timestamp: DateTime<Utc>,
    #[allow(dead_code)]
    hostname: String,
    probabilities: ServiceOperationProbabilities,
    #[allow(dead_code)]
    qps: ServiceOperationQps,
}

#[derive(Debug, Default)]
struct SamplingShard {
    // bucket start -> (service, operation) -> aggregate
    throughput: BTreeMap<DateTime<Utc>, BTreeMap<(String, String), Throughput>>,
    // append-only; never merged, latest snapshot wins wholesale
    snapshots: Vec<ProbabilitySnapshot>,
    next_seq: u64,
}

/// In-memory [`SamplingStore`].
///
/// Throughput is aggregated into one-minute buckets; probability snapshots
/// accumulate in an append-only log with store-assigned (timestamp,
/// sequence) labels so the "latest" lookup is deterministic even when two
/// hosts write within the same clock tick.
#[derive(Debug, Default)]
pub struct MemorySamplingStore {
    shard: Mutex<SamplingShard>,
}

fn lock(shard: &Mutex<SamplingShard>) -> Result<MutexGuard<'_, SamplingShard>> {
    shard
        .lock()
        .map_err(|_| StorageError::Internal("sampling store lock poisoned".into()))
}

fn bucket_of(ts: DateTime<Utc>) -> DateTime<Utc> {
    // truncation cannot fail for a one-minute granule
    ts.duration_trunc(bucket_width()).unwrap_or(ts)
}

impl MemorySamplingStore {
    pub fn new() -> Self {
        MemorySamplingStore::default()
    }

    /// Drops all stored data. Used by tests and the conformance harness.
    pub fn purge(&self) -> Result<()> {
        let mut shard = lock(&self.shard)?;
        *shard = SamplingShard::default();
        Ok(())
    }
}

#[async_trait]
impl SamplingStore for MemorySamplingStore {
    async fn insert_throughput(&self, throughput: Vec<Throughput>) -> Result<()> {
        let bucket = bucket_of(Utc::now());
        let mut shard = lock(&self.shard)?;
        let entries = shard.throughput.entry(bucket).or_default();
        for row in throughput {
            let key = (row.service.clone(), row.operation.clone());
            let aggregate = entries.entry(key).or_insert_with(|| Throughput {
                service: row.service.clone(),
                operation: row.operation.clone(),
                count: 0,
                probabilities: Default::default(),
            });
            aggregate.count += row.count;
            aggregate.probabilities.extend(row.probabilities);
        }
        Ok(())
    }

    async fn get_throughput(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Throughput>> {
        let shard = lock(&self.shard)?;
        Ok(shard
            .throughput
            .iter()
            .filter(|(bucket, _)| **bucket < end && **bucket + bucket_width() > start)
            .flat_map(|(_, entries)| entries.values().cloned())
            .collect())
    }

    async fn insert_probabilities_and_qps(
        &self,
        hostname: &str,
        probabilities: ServiceOperationProbabilities,
        qps: ServiceOperationQps,
    ) -> Result<()> {
        let mut shard = lock(&self.shard)?;
        let seq = shard.next_seq;
        shard.next_seq += 1;
        shard.snapshots.push(ProbabilitySnapshot {
            seq,
            timestamp: Utc::now(),
            hostname: hostname.to_owned(),
            probabilities,
            qps,
        });
        Ok(())
    }

    async fn get_latest_probabilities(&self) -> Result<ServiceOperationProbabilities> {
        let shard = lock(&self.shard)?;
        Ok(shard
            .snapshots
            .iter()
            .max_by_key(|snapshot| (snapshot.timestamp, snapshot.seq))
            .map(|snapshot| snapshot.probabilities.clone())
            .unwrap_or_default())
    }
}
