//! End-to-end exercise of the write path: spans flow through the pipeline
//! into storage while their throughput feeds the adaptive sampling loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use tokio::sync::oneshot;

use spanbase_collector::pipeline::SpanPipeline;
use spanbase_collector::throughput::{ThroughputAccumulator, ThroughputFlusher};
use spanbase_model::{KeyValue, Process, Span, SpanId, TraceId};
use spanbase_storage::memory::{MemorySamplingStore, MemoryStore};
use spanbase_storage::query::QueryService;
use spanbase_storage::sampling::adaptive::{ProbabilityRecomputer, RecomputerConfig};
use spanbase_storage::sampling::strategy::{AdaptiveStrategyProvider, StrategyProvider};

fn span(trace: u64, operation: &str) -> Span {
    Span {
        trace_id: TraceId::new(0, trace),
        span_id: SpanId::new(1),
        operation_name: operation.into(),
        references: vec![],
        flags: 0,
        start_time: Utc.with_ymd_and_hms(2017, 1, 26, 13, 0, 0).unwrap(),
        duration: TimeDelta::milliseconds(9),
        tags: vec![KeyValue::string("telemetry.sdk.language", "rust")],
        logs: vec![],
        process: Process::new("checkout", vec![]),
    }
}

#[tokio::test]
async fn spans_land_in_storage_and_drive_sampling() {
    let store = Arc::new(MemoryStore::new());
    let sampling = Arc::new(MemorySamplingStore::new());
    let accumulator = Arc::new(ThroughputAccumulator::new());

    let pipeline = SpanPipeline::builder(store.clone())
        .with_throughput(accumulator.clone())
        .build();

    for i in 0..120 {
        pipeline.submit(span(i + 1, "pay")).expect("queue accepts");
    }
    pipeline.force_flush().await.expect("flush");

    // storage side: spans are queryable and canonicalized
    let query = QueryService::new(store);
    let trace = query.get_trace(TraceId::new(0, 1)).await.expect("trace");
    assert!(trace.spans[0].tags.is_empty());
    assert_eq!(
        trace.spans[0].process.tags,
        vec![KeyValue::string("telemetry.sdk.language", "rust")]
    );

    // sampling side: throughput -> recomputer -> strategy
    let (stop, stopped) = oneshot::channel();
    let flusher = ThroughputFlusher::new(
        accumulator,
        sampling.clone(),
        Duration::from_secs(3600),
    );
    let task = tokio::spawn(flusher.run(stopped));
    stop.send(()).expect("flusher alive");
    task.await.expect("flusher stops");

    let recomputer = ProbabilityRecomputer::new(
        sampling.clone(),
        RecomputerConfig {
            window: TimeDelta::minutes(2),
            target_traces_per_second: 1.0,
            initial_sampling_probability: 1.0,
            ..RecomputerConfig::default()
        },
    );
    recomputer.recompute_once().await.expect("recompute");

    let provider = AdaptiveStrategyProvider::new(sampling);
    let response = provider
        .get_sampling_strategy("checkout")
        .await
        .expect("strategy");
    let per_operation = response.operation_sampling.expect("per-operation strategies");
    assert_eq!(per_operation.per_operation_strategies.len(), 1);
    let pay = &per_operation.per_operation_strategies[0];
    assert_eq!(pay.operation, "pay");
    assert!(pay.probabilistic_sampling.sampling_rate <= 1.0);
    assert!(pay.probabilistic_sampling.sampling_rate > 0.0);
}
