//! Batching span pipeline between receivers and a span writer.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use spanbase_model::adjuster::{AdjusterPipeline, OtelTagAdjuster};
use spanbase_model::{Span, Trace};
use spanbase_storage::spanstore::SpanWriter;

use crate::throughput::ThroughputAccumulator;

/// Default bound of the ingest queue.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 2_048;
/// Default number of spans written per drain.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 512;
/// Default delay between two consecutive drains.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Errors surfaced to receivers by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The bounded queue is at capacity. Retryable: the receiver should
    /// back off and resubmit rather than block.
    #[error("span queue is full")]
    QueueFull,

    /// The pipeline worker has shut down.
    #[error("span pipeline has shut down")]
    ShutDown,
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::QueueFull)
    }
}

#[derive(Debug)]
enum Message {
    Span(Box<Span>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle receivers use to feed spans into storage.
///
/// Cloneable and cheap; all clones share one worker task. Submission never
/// blocks: when the queue is full the caller gets
/// [`PipelineError::QueueFull`] and decides how to retry.
#[derive(Clone, Debug)]
pub struct SpanPipeline {
    sender: mpsc::Sender<Message>,
}

impl SpanPipeline {
    pub fn builder(writer: Arc<dyn SpanWriter>) -> SpanPipelineBuilder {
        SpanPipelineBuilder::new(writer)
    }

    /// Enqueues one span for writing.
    pub fn submit(&self, span: Span) -> Result<(), PipelineError> {
        self.sender
            .try_send(Message::Span(Box::new(span)))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => PipelineError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => PipelineError::ShutDown,
            })
    }

    /// Drains everything queued so far and waits for the writes.
    pub async fn force_flush(&self) -> Result<(), PipelineError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Message::Flush(ack))
            .await
            .map_err(|_| PipelineError::ShutDown)?;
        done.await.map_err(|_| PipelineError::ShutDown)
    }

    /// Flushes and stops the worker. Subsequent submissions fail with
    /// [`PipelineError::ShutDown`].
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Message::Shutdown(ack))
            .await
            .map_err(|_| PipelineError::ShutDown)?;
        done.await.map_err(|_| PipelineError::ShutDown)
    }
}

/// Configures and spawns a [`SpanPipeline`].
pub struct SpanPipelineBuilder {
    writer: Arc<dyn SpanWriter>,
    adjusters: AdjusterPipeline,
    throughput: Option<Arc<ThroughputAccumulator>>,
    max_queue_size: usize,
    max_batch_size: usize,
    flush_interval: Duration,
}

impl SpanPipelineBuilder {
    pub fn new(writer: Arc<dyn SpanWriter>) -> Self {
        SpanPipelineBuilder {
            writer,
            // only idempotent normalizations run on the write path; the
            // full pipeline runs again on every read
            adjusters: AdjusterPipeline::new().with(OtelTagAdjuster),
            throughput: None,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    /// Replaces the write-path adjusters. They must be idempotent because
    /// the read path applies the standard pipeline again.
    pub fn with_adjusters(mut self, adjusters: AdjusterPipeline) -> Self {
        self.adjusters = adjusters;
        self
    }

    /// Counts accepted spans toward adaptive sampling throughput.
    pub fn with_throughput(mut self, accumulator: Arc<ThroughputAccumulator>) -> Self {
        self.throughput = Some(accumulator);
        self
    }

    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size.max(1);
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Spawns the worker task and returns the submission handle.
    pub fn build(self) -> SpanPipeline {
        let (sender, receiver) = mpsc::channel(self.max_queue_size);
        let worker = Worker {
            writer: self.writer,
            adjusters: self.adjusters,
            throughput: self.throughput,
            max_batch_size: self.max_batch_size,
        };
        tokio::spawn(worker.run(receiver, self.flush_interval));
        SpanPipeline { sender }
    }
}

struct Worker {
    writer: Arc<dyn SpanWriter>,
    adjusters: AdjusterPipeline,
    throughput: Option<Arc<ThroughputAccumulator>>,
    max_batch_size: usize,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::Receiver<Message>, flush_interval: Duration) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut batch: Vec<Span> = Vec::with_capacity(self.max_batch_size);
        loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(Message::Span(span)) => {
                        batch.push(*span);
                        if batch.len() >= self.max_batch_size {
                            self.drain(&mut batch).await;
                        }
                    }
                    Some(Message::Flush(ack)) => {
                        self.drain(&mut batch).await;
                        let _ = ack.send(());
                    }
                    Some(Message::Shutdown(ack)) => {
                        self.drain(&mut batch).await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.drain(&mut batch).await;
                        return;
                    }
                },
                _ = ticker.tick() => self.drain(&mut batch).await,
            }
        }
    }

    async fn drain(&self, batch: &mut Vec<Span>) {
        if batch.is_empty() {
            return;
        }
        debug!(spans = batch.len(), "draining span batch");
        for span in batch.drain(..) {
            // adjusters operate on traces; wrap, normalize, unwrap
            let mut trace = Trace::new(vec![span]);
            self.adjusters.adjust(&mut trace);
            for span in trace.spans {
                if let Some(throughput) = &self.throughput {
                    throughput.record_span(&span);
                }
                if let Err(err) = self.writer.write_span(&span).await {
                    // retry policy belongs to the receiver layer; here we
                    // only classify and report
                    warn!(
                        trace_id = %span.trace_id,
                        retryable = err.is_retryable(),
                        error = %err,
                        "span write failed"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeDelta, TimeZone, Utc};
    use spanbase_model::{KeyValue, Process, SpanId, TraceId};
    use spanbase_storage::memory::MemoryStore;
    use spanbase_storage::spanstore::SpanReader;
    use spanbase_storage::Result as StorageResult;
    use tokio::sync::Semaphore;

    fn span(trace: u64, tags: Vec<KeyValue>) -> Span {
        Span {
            trace_id: TraceId::new(0, trace),
            span_id: SpanId::new(trace),
            operation_name: "op".into(),
            references: vec![],
            flags: 0,
            start_time: Utc.with_ymd_and_hms(2017, 1, 26, 11, 0, 0).unwrap(),
            duration: TimeDelta::milliseconds(2),
            tags,
            logs: vec![],
            process: Process::new("svc", vec![]),
        }
    }

    #[tokio::test]
    async fn spans_reach_storage_normalized() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = SpanPipeline::builder(store.clone()).build();

        pipeline
            .submit(span(
                1,
                vec![
                    KeyValue::string("http.method", "GET"),
                    KeyValue::string("telemetry.sdk.name", "otel"),
                ],
            ))
            .unwrap();
        pipeline.force_flush().await.unwrap();

        let trace = store.get_trace(TraceId::new(0, 1)).await.unwrap();
        let stored = &trace.spans[0];
        assert_eq!(stored.tags, vec![KeyValue::string("http.method", "GET")]);
        assert_eq!(
            stored.process.tags,
            vec![KeyValue::string("telemetry.sdk.name", "otel")]
        );
    }

    #[tokio::test]
    async fn shutdown_flushes_and_rejects_later_submissions() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = SpanPipeline::builder(store.clone()).build();

        pipeline.submit(span(1, vec![])).unwrap();
        pipeline.shutdown().await.unwrap();

        assert!(store.get_trace(TraceId::new(0, 1)).await.is_ok());
        let err = pipeline.submit(span(2, vec![])).unwrap_err();
        assert!(matches!(err, PipelineError::ShutDown));
    }

    #[derive(Debug)]
    struct GatedWriter {
        gate: Arc<Semaphore>,
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl SpanWriter for GatedWriter {
        async fn write_span(&self, span: &Span) -> StorageResult<()> {
            let permit = self.gate.acquire().await.expect("gate closed");
            permit.forget();
            self.inner.write_span(span).await
        }
    }

    #[tokio::test]
    async fn full_queue_surfaces_retryable_backpressure() {
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(GatedWriter {
            gate: gate.clone(),
            inner: store.clone(),
        });
        let pipeline = SpanPipeline::builder(writer)
            .with_max_queue_size(2)
            .with_max_batch_size(1)
            .build();

        // the worker stalls on the gated writer; keep submitting until the
        // bounded queue pushes back
        let mut queue_full = None;
        for i in 0..64 {
            match pipeline.submit(span(i, vec![])) {
                Ok(()) => tokio::task::yield_now().await,
                Err(err) => {
                    queue_full = Some(err);
                    break;
                }
            }
        }
        let err = queue_full.expect("queue never filled");
        assert!(matches!(err, PipelineError::QueueFull));
        assert!(err.is_retryable());

        gate.add_permits(1024);
        pipeline.shutdown().await.unwrap();
    }
}
