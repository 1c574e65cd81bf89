//! Periodic recomputation of sampling probabilities from observed
//! throughput.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use spanbase_model::{ServiceOperationProbabilities, ServiceOperationQps};

use crate::error::Result;
use crate::samplingstore::SamplingStore;

/// Tuning knobs for the [`ProbabilityRecomputer`].
#[derive(Clone, Debug)]
pub struct RecomputerConfig {
    /// How often a new snapshot is produced.
    pub interval: Duration,
    /// How far back throughput is aggregated per round.
    pub window: TimeDelta,
    /// Desired sampled traces per second per (service, operation).
    pub target_traces_per_second: f64,
    /// Probability floor; operations never sample below this.
    pub min_sampling_probability: f64,
    /// Probability assigned before any throughput has been observed.
    pub initial_sampling_probability: f64,
    /// Host label stamped on the snapshots this instance writes.
    pub hostname: String,
}

impl Default for RecomputerConfig {
    fn default() -> Self {
        RecomputerConfig {
            interval: Duration::from_secs(60),
            window: TimeDelta::minutes(10),
            target_traces_per_second: 1.0,
            min_sampling_probability: 1e-5,
            initial_sampling_probability: 0.001,
            hostname: "spanbase".to_owned(),
        }
    }
}

/// Turns throughput aggregates into probability snapshots.
///
/// Each round reads the throughput of the configured window, derives the
/// observed QPS per (service, operation), scales the prior probability
/// toward the target rate and writes the whole snapshot back to the store.
#[derive(Debug)]
pub struct ProbabilityRecomputer {
    store: Arc<dyn SamplingStore>,
    config: RecomputerConfig,
}

impl ProbabilityRecomputer {
    pub fn new(store: Arc<dyn SamplingStore>, config: RecomputerConfig) -> Self {
        ProbabilityRecomputer { store, config }
    }

    /// Runs one recomputation round.
    pub async fn recompute_once(&self) -> Result<()> {
        let end = Utc::now();
        let start = end - self.config.window;
        let throughput = self.store.get_throughput(start, end).await?;
        if throughput.is_empty() {
            debug!("no throughput observed, keeping previous probabilities");
            return Ok(());
        }

        let window_secs = self.config.window.num_seconds().max(1) as f64;
        let prior = self.store.get_latest_probabilities().await?;

        let mut probabilities = ServiceOperationProbabilities::new();
        let mut qps = ServiceOperationQps::new();
        for row in throughput {
            let observed_qps = row.count as f64 / window_secs;
            let current = prior
                .get(&row.service)
                .and_then(|operations| operations.get(&row.operation))
                .copied()
                .unwrap_or(self.config.initial_sampling_probability);

            let next = if observed_qps > 0.0 {
                current * (self.config.target_traces_per_second / observed_qps)
            } else {
                // quiet operation: probe upward so it is not starved forever
                current * 2.0
            };
            let next = next.clamp(self.config.min_sampling_probability, 1.0);

            probabilities
                .entry(row.service.clone())
                .or_default()
                .insert(row.operation.clone(), next);
            qps.entry(row.service)
                .or_default()
                .insert(row.operation, observed_qps);
        }

        self.store
            .insert_probabilities_and_qps(&self.config.hostname, probabilities, qps)
            .await
    }

    /// Recomputes on the configured interval until `shutdown` fires.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        // the first tick completes immediately; skip it
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.recompute_once().await {
                        warn!(error = %err, "sampling probability recomputation failed");
                    }
                }
                _ = &mut shutdown => {
                    debug!("probability recomputer shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySamplingStore;
    use crate::samplingstore::SamplingStore;
    use spanbase_model::Throughput;

    fn config() -> RecomputerConfig {
        RecomputerConfig {
            window: TimeDelta::minutes(1),
            target_traces_per_second: 1.0,
            initial_sampling_probability: 0.5,
            ..RecomputerConfig::default()
        }
    }

    #[tokio::test]
    async fn busy_operations_are_sampled_down() {
        let store = Arc::new(MemorySamplingStore::new());
        // 600 traces over a 60 second window: 10 qps against a 1 tps target
        store
            .insert_throughput(vec![Throughput::new("svc", "op", 600)])
            .await
            .unwrap();

        let recomputer = ProbabilityRecomputer::new(store.clone(), config());
        recomputer.recompute_once().await.unwrap();

        let latest = store.get_latest_probabilities().await.unwrap();
        let p = latest["svc"]["op"];
        assert!((p - 0.05).abs() < 1e-9, "expected 0.5 * (1/10), got {p}");
    }

    #[tokio::test]
    async fn probabilities_never_exceed_one() {
        let store = Arc::new(MemorySamplingStore::new());
        // 6 traces per minute: 0.1 qps, scaling would push far above 1.0
        store
            .insert_throughput(vec![Throughput::new("svc", "op", 6)])
            .await
            .unwrap();

        let recomputer = ProbabilityRecomputer::new(store.clone(), config());
        recomputer.recompute_once().await.unwrap();

        let latest = store.get_latest_probabilities().await.unwrap();
        assert_eq!(latest["svc"]["op"], 1.0);
    }

    #[tokio::test]
    async fn no_throughput_means_no_new_snapshot() {
        let store = Arc::new(MemorySamplingStore::new());
        let recomputer = ProbabilityRecomputer::new(store.clone(), config());
        recomputer.recompute_once().await.unwrap();
        assert!(store.get_latest_probabilities().await.unwrap().is_empty());
    }
}
