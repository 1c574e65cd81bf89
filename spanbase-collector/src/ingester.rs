//! Replay ingester: drains encoded span messages from a durable log into
//! a span writer.
//!
//! The log itself is a seam. In production deployments it is a Kafka topic
//! (see the `kafka` receiver configuration); conformance and unit tests run
//! against the bundled [`InProcessLog`]. Both honor the same semantics:
//! messages carry monotonically increasing offsets, and a consumer starts
//! either at the earliest retained offset or at the tail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use spanbase_model::adjuster::{AdjusterPipeline, OtelTagAdjuster};
use spanbase_model::{Span, Trace};
use spanbase_storage::config::{InitialOffset, SpanEncoding};
use spanbase_storage::spanstore::SpanWriter;
use spanbase_storage::StorageError;

/// One encoded span message with its position in the log.
#[derive(Clone, Debug)]
pub struct SpanMessage {
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// A consumer over a replayable span log.
#[async_trait]
pub trait SpanMessageSource: Send {
    /// The next message, or `None` once the log is closed and drained.
    async fn next_message(&mut self) -> Option<SpanMessage>;
}

#[derive(Debug)]
struct LogInner {
    messages: Mutex<Vec<Arc<[u8]>>>,
    closed: AtomicBool,
    // bumped on every publish/close; consumers block on it race-free
    version: watch::Sender<u64>,
}

/// An in-process replayable log with Kafka-like offset semantics.
#[derive(Clone, Debug)]
pub struct InProcessLog {
    inner: Arc<LogInner>,
}

impl Default for InProcessLog {
    fn default() -> Self {
        InProcessLog::new()
    }
}

impl InProcessLog {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        InProcessLog {
            inner: Arc::new(LogInner {
                messages: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                version,
            }),
        }
    }

    /// Appends one message and wakes blocked consumers.
    pub fn publish(&self, payload: Vec<u8>) {
        let mut messages = self
            .inner
            .messages
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        messages.push(payload.into());
        drop(messages);
        self.inner.version.send_modify(|v| *v += 1);
    }

    /// Marks the log closed; consumers drain what remains and stop.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.version.send_modify(|v| *v += 1);
    }

    /// A consumer starting at the earliest retained offset or at the tail.
    pub fn subscribe(&self, initial_offset: InitialOffset) -> InProcessConsumer {
        let position = match initial_offset {
            InitialOffset::Earliest => 0,
            InitialOffset::Latest => self
                .inner
                .messages
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .len(),
        };
        InProcessConsumer {
            version: self.inner.version.subscribe(),
            inner: self.inner.clone(),
            position,
        }
    }
}

/// Consumer side of [`InProcessLog`].
#[derive(Debug)]
pub struct InProcessConsumer {
    inner: Arc<LogInner>,
    version: watch::Receiver<u64>,
    position: usize,
}

#[async_trait]
impl SpanMessageSource for InProcessConsumer {
    async fn next_message(&mut self) -> Option<SpanMessage> {
        loop {
            {
                let messages = self
                    .inner
                    .messages
                    .lock()
                    .unwrap_or_else(|err| err.into_inner());
                if self.position < messages.len() {
                    let message = SpanMessage {
                        offset: self.position as u64,
                        payload: messages[self.position].to_vec(),
                    };
                    self.position += 1;
                    return Some(message);
                }
            }
            if self.inner.closed.load(Ordering::Acquire) {
                return None;
            }
            // a publish racing with the emptiness check bumps the version
            // we have not observed yet, so this returns immediately
            if self.version.changed().await.is_err() {
                return None;
            }
        }
    }
}

/// Counters reported after an ingester run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngesterStats {
    pub written: u64,
    pub failed: u64,
    pub malformed: u64,
}

/// Replays a span log into storage.
pub struct Ingester {
    source: Box<dyn SpanMessageSource>,
    writer: Arc<dyn SpanWriter>,
    adjusters: AdjusterPipeline,
}

impl Ingester {
    /// Wires a consumer to a writer.
    ///
    /// Only JSON payloads can be decoded here; protobuf-encoded topics are
    /// handled by the protocol receivers and rejected with a capability
    /// error.
    pub fn new(
        source: impl SpanMessageSource + 'static,
        writer: Arc<dyn SpanWriter>,
        encoding: SpanEncoding,
    ) -> Result<Self, StorageError> {
        if encoding != SpanEncoding::Json {
            return Err(StorageError::Unsupported(
                "only json span encoding is decodable by the ingester",
            ));
        }
        Ok(Ingester {
            source: Box::new(source),
            writer,
            adjusters: AdjusterPipeline::new().with(OtelTagAdjuster),
        })
    }

    /// Consumes until the source is exhausted.
    ///
    /// A message that fails to decode is a fatal-record condition: it is
    /// logged and skipped, the run keeps going. Write failures are counted
    /// and logged; offsets keep advancing either way.
    pub async fn run(mut self) -> IngesterStats {
        let mut stats = IngesterStats::default();
        while let Some(message) = self.source.next_message().await {
            let span: Span = match serde_json::from_slice(&message.payload) {
                Ok(span) => span,
                Err(err) => {
                    warn!(
                        offset = message.offset,
                        error = %err,
                        "dropping undecodable span message"
                    );
                    stats.malformed += 1;
                    continue;
                }
            };

            let mut trace = Trace::new(vec![span]);
            self.adjusters.adjust(&mut trace);
            for span in trace.spans {
                match self.writer.write_span(&span).await {
                    Ok(()) => stats.written += 1,
                    Err(err) => {
                        warn!(
                            offset = message.offset,
                            trace_id = %span.trace_id,
                            error = %err,
                            "replayed span write failed"
                        );
                        stats.failed += 1;
                    }
                }
            }
        }
        debug!(?stats, "ingester drained its source");
        stats
    }
}
