//! Bounded in-memory storage backend.
//!
//! Spans live in a single guarded map keyed by trace id with FIFO eviction
//! at `max_traces`: once the bound is reached the oldest trace by insertion
//! order is dropped. Eviction order is observable through queries, so FIFO
//! is part of the contract and not interchangeable with LRU.

mod sampling;

pub use sampling::MemorySamplingStore;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use spanbase_model::{DependencyLink, Span, Trace, TraceId};

use crate::dependencystore::{DependencyReader, DependencyWriter};
use crate::error::{Result, StorageError};
use crate::spanstore::{
    sort_and_limit, trace_matches, Operation, OperationQueryParameters, SpanReader, SpanWriter,
    TraceQueryParameters,
};

/// Default capacity bound of the in-memory store.
pub const DEFAULT_MAX_TRACES: usize = 100_000;

#[derive(Debug, Default)]
struct DependencySnapshot {
    end_ts: DateTime<Utc>,
    links: Vec<DependencyLink>,
}

#[derive(Debug)]
struct Shard {
    max_traces: usize,
    traces: HashMap<TraceId, Trace>,
    // insertion order of trace ids, oldest first; drives FIFO eviction
    insertion_order: VecDeque<TraceId>,
    services: HashSet<String>,
    operations: HashMap<String, HashSet<Operation>>,
    dependencies: Vec<DependencySnapshot>,
}

impl Shard {
    fn new(max_traces: usize) -> Self {
        Shard {
            max_traces,
            traces: HashMap::new(),
            insertion_order: VecDeque::new(),
            services: HashSet::new(),
            operations: HashMap::new(),
            dependencies: Vec::new(),
        }
    }
}

/// In-memory implementation of the span, dependency and (via
/// [`MemorySamplingStore`]) sampling contracts.
#[derive(Debug)]
pub struct MemoryStore {
    shard: Mutex<Shard>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

fn lock(shard: &Mutex<Shard>) -> Result<MutexGuard<'_, Shard>> {
    shard
        .lock()
        .map_err(|_| StorageError::Internal("memory store lock poisoned".into()))
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::with_max_traces(DEFAULT_MAX_TRACES)
    }

    pub fn with_max_traces(max_traces: usize) -> Self {
        MemoryStore {
            shard: Mutex::new(Shard::new(max_traces)),
        }
    }

    /// Drops all stored data. Used by tests and the conformance harness.
    pub fn purge(&self) -> Result<()> {
        let mut shard = lock(&self.shard)?;
        let max_traces = shard.max_traces;
        *shard = Shard::new(max_traces);
        Ok(())
    }

    fn index_span(shard: &mut Shard, span: &Span) {
        let service = span.service_name().to_owned();
        let operation = Operation {
            name: span.operation_name.clone(),
            span_kind: Some(span.span_kind().unwrap_or_default()),
        };
        shard
            .operations
            .entry(service.clone())
            .or_default()
            .insert(operation);
        shard.services.insert(service);
    }
}

#[async_trait]
impl SpanWriter for MemoryStore {
    async fn write_span(&self, span: &Span) -> Result<()> {
        let mut shard = lock(&self.shard)?;
        Self::index_span(&mut shard, span);

        if let Some(trace) = shard.traces.get_mut(&span.trace_id) {
            trace.spans.push(span.clone());
            return Ok(());
        }

        if shard.insertion_order.len() >= shard.max_traces {
            if let Some(evicted) = shard.insertion_order.pop_front() {
                shard.traces.remove(&evicted);
                debug!(trace_id = %evicted, "evicted oldest trace at capacity");
            }
        }
        shard
            .traces
            .insert(span.trace_id, Trace::new(vec![span.clone()]));
        shard.insertion_order.push_back(span.trace_id);
        Ok(())
    }
}

#[async_trait]
impl SpanReader for MemoryStore {
    async fn get_trace(&self, trace_id: TraceId) -> Result<Trace> {
        let shard = lock(&self.shard)?;
        shard
            .traces
            .get(&trace_id)
            .cloned()
            .ok_or(StorageError::TraceNotFound)
    }

    async fn get_services(&self) -> Result<Vec<String>> {
        let shard = lock(&self.shard)?;
        Ok(shard.services.iter().cloned().collect())
    }

    async fn get_operations(&self, query: &OperationQueryParameters) -> Result<Vec<Operation>> {
        let shard = lock(&self.shard)?;
        let operations = match shard.operations.get(&query.service_name) {
            Some(operations) => operations,
            None => return Ok(Vec::new()),
        };
        Ok(operations
            .iter()
            .filter(|op| match query.span_kind {
                Some(kind) => op.span_kind == Some(kind),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn find_traces(&self, query: &TraceQueryParameters) -> Result<Vec<Trace>> {
        query.validate()?;
        let shard = lock(&self.shard)?;
        let mut matches: Vec<Trace> = shard
            .traces
            .values()
            .filter(|trace| trace_matches(trace, query))
            .cloned()
            .collect();
        drop(shard);
        sort_and_limit(&mut matches, query.num_traces);
        Ok(matches)
    }

    async fn find_trace_ids(&self, query: &TraceQueryParameters) -> Result<Vec<TraceId>> {
        let traces = self.find_traces(query).await?;
        Ok(traces
            .iter()
            .filter_map(|trace| trace.spans.first().map(|span| span.trace_id))
            .collect())
    }
}

#[async_trait]
impl DependencyWriter for MemoryStore {
    async fn write_dependencies(
        &self,
        end_ts: DateTime<Utc>,
        links: Vec<DependencyLink>,
    ) -> Result<()> {
        let mut shard = lock(&self.shard)?;
        shard.dependencies.push(DependencySnapshot { end_ts, links });
        Ok(())
    }
}

#[async_trait]
impl DependencyReader for MemoryStore {
    async fn get_dependencies(
        &self,
        end_ts: DateTime<Utc>,
        lookback: TimeDelta,
    ) -> Result<Vec<DependencyLink>> {
        let shard = lock(&self.shard)?;
        let from = end_ts - lookback;
        Ok(shard
            .dependencies
            .iter()
            .filter(|snapshot| snapshot.end_ts >= from && snapshot.end_ts <= end_ts)
            .flat_map(|snapshot| snapshot.links.iter().cloned())
            .collect())
    }
}
