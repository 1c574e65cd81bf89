//! Per-(service, operation) traffic accounting for adaptive sampling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use spanbase_model::{Span, Throughput};
use spanbase_storage::samplingstore::SamplingStore;

/// Counts spans per (service, operation) between drains.
///
/// The write path records into it on every accepted span; the
/// [`ThroughputFlusher`] drains it into the sampling store on an interval.
#[derive(Debug, Default)]
pub struct ThroughputAccumulator {
    counts: Mutex<HashMap<(String, String), u64>>,
}

impl ThroughputAccumulator {
    pub fn new() -> Self {
        ThroughputAccumulator::default()
    }

    pub fn record_span(&self, span: &Span) {
        let key = (
            span.service_name().to_owned(),
            span.operation_name.clone(),
        );
        let mut counts = self.counts.lock().unwrap_or_else(|err| err.into_inner());
        *counts.entry(key).or_insert(0) += 1;
    }

    /// Takes the accumulated counts, leaving the accumulator empty.
    pub fn drain(&self) -> Vec<Throughput> {
        let mut counts = self.counts.lock().unwrap_or_else(|err| err.into_inner());
        counts
            .drain()
            .map(|((service, operation), count)| Throughput {
                service,
                operation,
                count,
                probabilities: Default::default(),
            })
            .collect()
    }
}

/// Periodically moves accumulated throughput into the sampling store.
#[derive(Debug)]
pub struct ThroughputFlusher {
    accumulator: Arc<ThroughputAccumulator>,
    store: Arc<dyn SamplingStore>,
    interval: Duration,
}

impl ThroughputFlusher {
    pub fn new(
        accumulator: Arc<ThroughputAccumulator>,
        store: Arc<dyn SamplingStore>,
        interval: Duration,
    ) -> Self {
        ThroughputFlusher {
            accumulator,
            store,
            interval,
        }
    }

    async fn flush_once(&self) {
        let rows = self.accumulator.drain();
        if rows.is_empty() {
            return;
        }
        debug!(rows = rows.len(), "flushing throughput");
        if let Err(err) = self.store.insert_throughput(rows).await {
            warn!(error = %err, "throughput flush failed");
        }
    }

    /// Flushes on the interval until `shutdown` fires, then once more so
    /// nothing counted is lost.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush_once().await,
                _ = &mut shutdown => {
                    self.flush_once().await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use spanbase_model::{Process, SpanId, TraceId};
    use spanbase_storage::memory::MemorySamplingStore;

    fn span(service: &str, operation: &str) -> Span {
        Span {
            trace_id: TraceId::new(0, 1),
            span_id: SpanId::new(1),
            operation_name: operation.into(),
            references: vec![],
            flags: 0,
            start_time: Utc.with_ymd_and_hms(2017, 1, 26, 11, 0, 0).unwrap(),
            duration: TimeDelta::milliseconds(1),
            tags: vec![],
            logs: vec![],
            process: Process::new(service, vec![]),
        }
    }

    #[test]
    fn counts_aggregate_until_drained() {
        let accumulator = ThroughputAccumulator::new();
        accumulator.record_span(&span("svc", "op"));
        accumulator.record_span(&span("svc", "op"));
        accumulator.record_span(&span("svc", "other"));

        let mut rows = accumulator.drain();
        rows.sort_by(|a, b| a.operation.cmp(&b.operation));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].operation, "op");
        assert_eq!(rows[0].count, 2);

        assert!(accumulator.drain().is_empty());
    }

    #[tokio::test]
    async fn shutdown_flushes_the_remainder() {
        let accumulator = Arc::new(ThroughputAccumulator::new());
        let store = Arc::new(MemorySamplingStore::new());
        accumulator.record_span(&span("svc", "op"));

        let (stop, stopped) = oneshot::channel();
        let flusher = ThroughputFlusher::new(
            accumulator,
            store.clone(),
            Duration::from_secs(3600),
        );
        let task = tokio::spawn(flusher.run(stopped));
        stop.send(()).expect("flusher alive");
        task.await.expect("flusher task");

        let now = Utc::now();
        let rows = store
            .get_throughput(now - TimeDelta::minutes(5), now + TimeDelta::minutes(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 1);
    }
}
