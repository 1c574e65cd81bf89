//! Durable storage backend over an embedded [`sled`] database.
//!
//! One tree per concern: spans keyed by `(trace id, span id, sequence)`,
//! service and operation indexes, and dependency snapshots keyed by their
//! end timestamp. Values are JSON-encoded model records. Durability is
//! delegated to sled's write-ahead log; [`SledStore::flush`] forces an
//! fsync and is what the conformance harness calls on `refresh`.
//!
//! The backend implements the span and dependency contracts. It has no
//! archive namespace and no sampling capability; the capability façade
//! reports both as absent, which callers treat as benign.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use spanbase_model::{DependencyLink, Span, Trace, TraceId};

use crate::dependencystore::{DependencyReader, DependencyWriter};
use crate::error::{Result, StorageError};
use crate::spanstore::{
    sort_and_limit, trace_matches, Operation, OperationQueryParameters, SpanReader, SpanWriter,
    TraceQueryParameters,
};

const SPANS_TREE: &str = "spans";
const SERVICES_TREE: &str = "services";
const OPERATIONS_TREE: &str = "operations";
const DEPENDENCIES_TREE: &str = "dependencies";

const KEY_SEPARATOR: u8 = 0x00;

/// sled-backed implementation of the span and dependency contracts.
#[derive(Debug)]
pub struct SledStore {
    db: sled::Db,
    spans: sled::Tree,
    services: sled::Tree,
    operations: sled::Tree,
    dependencies: sled::Tree,
}

fn trace_key(trace_id: TraceId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&trace_id.high.to_be_bytes());
    key[8..].copy_from_slice(&trace_id.low.to_be_bytes());
    key
}

fn span_key(span: &Span, seq: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(&trace_key(span.trace_id));
    key[16..24].copy_from_slice(&span.span_id.0.to_be_bytes());
    key[24..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn dependency_key(end_ts: DateTime<Utc>, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    // sign-flipped millis keep the byte order aligned with time order
    let millis = (end_ts.timestamp_millis() as u64) ^ (1 << 63);
    key[..8].copy_from_slice(&millis.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn operation_key(service: &str, operation: &Operation) -> Vec<u8> {
    let kind = operation
        .span_kind
        .map(|kind| kind.to_string())
        .unwrap_or_default();
    let mut key = Vec::with_capacity(service.len() + operation.name.len() + kind.len() + 2);
    key.extend_from_slice(service.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(operation.name.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(kind.as_bytes());
    key
}

fn service_prefix(service: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(service.len() + 1);
    prefix.extend_from_slice(service.as_bytes());
    prefix.push(KEY_SEPARATOR);
    prefix
}

impl SledStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::Config::new().path(path).open()?;
        let spans = db.open_tree(SPANS_TREE)?;
        let services = db.open_tree(SERVICES_TREE)?;
        let operations = db.open_tree(OPERATIONS_TREE)?;
        let dependencies = db.open_tree(DEPENDENCIES_TREE)?;
        Ok(SledStore {
            db,
            spans,
            services,
            operations,
            dependencies,
        })
    }

    /// Forces the write-ahead log to disk so subsequent reads observe all
    /// prior writes.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Removes every record. Used by tests and the conformance harness.
    pub fn purge(&self) -> Result<()> {
        self.spans.clear()?;
        self.services.clear()?;
        self.operations.clear()?;
        self.dependencies.clear()?;
        self.flush()
    }

    fn all_traces(&self) -> Result<Vec<Trace>> {
        let mut traces: HashMap<TraceId, Trace> = HashMap::new();
        for entry in self.spans.iter() {
            let (_, value) = entry?;
            let span: Span = serde_json::from_slice(&value)?;
            traces
                .entry(span.trace_id)
                .or_insert_with(|| Trace::new(Vec::new()))
                .spans
                .push(span);
        }
        Ok(traces.into_values().collect())
    }
}

#[async_trait]
impl SpanWriter for SledStore {
    async fn write_span(&self, span: &Span) -> Result<()> {
        let seq = self.db.generate_id()?;
        let record = serde_json::to_vec(span)?;
        self.spans.insert(span_key(span, seq), record)?;

        let service = span.service_name();
        self.services
            .insert(service.as_bytes(), sled::IVec::default())?;
        let operation = Operation {
            name: span.operation_name.clone(),
            span_kind: Some(span.span_kind().unwrap_or_default()),
        };
        self.operations.insert(
            operation_key(service, &operation),
            serde_json::to_vec(&operation)?,
        )?;
        Ok(())
    }
}

#[async_trait]
impl SpanReader for SledStore {
    async fn get_trace(&self, trace_id: TraceId) -> Result<Trace> {
        let mut spans = Vec::new();
        for entry in self.spans.scan_prefix(trace_key(trace_id)) {
            let (_, value) = entry?;
            spans.push(serde_json::from_slice(&value)?);
        }
        if spans.is_empty() {
            return Err(StorageError::TraceNotFound);
        }
        Ok(Trace::new(spans))
    }

    async fn get_services(&self) -> Result<Vec<String>> {
        let mut services = Vec::new();
        for entry in self.services.iter() {
            let (key, _) = entry?;
            services.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(services)
    }

    async fn get_operations(&self, query: &OperationQueryParameters) -> Result<Vec<Operation>> {
        let mut operations = Vec::new();
        for entry in self
            .operations
            .scan_prefix(service_prefix(&query.service_name))
        {
            let (_, value) = entry?;
            let operation: Operation = serde_json::from_slice(&value)?;
            if let Some(kind) = query.span_kind {
                if operation.span_kind != Some(kind) {
                    continue;
                }
            }
            operations.push(operation);
        }
        Ok(operations)
    }

    async fn find_traces(&self, query: &TraceQueryParameters) -> Result<Vec<Trace>> {
        query.validate()?;
        let mut matches: Vec<Trace> = self
            .all_traces()?
            .into_iter()
            .filter(|trace| trace_matches(trace, query))
            .collect();
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
impl DependencyWriter for SledStore {
    async fn write_dependencies(
        &self,
        end_ts: DateTime<Utc>,
        links: Vec<DependencyLink>,
    ) -> Result<()> {
        let seq = self.db.generate_id()?;
        self.dependencies
            .insert(dependency_key(end_ts, seq), serde_json::to_vec(&links)?)?;
        Ok(())
    }
}

#[async_trait]
impl DependencyReader for SledStore {
    async fn get_dependencies(
        &self,
        end_ts: DateTime<Utc>,
        lookback: TimeDelta,
    ) -> Result<Vec<DependencyLink>> {
        let from = dependency_key(end_ts - lookback, 0);
        let to = dependency_key(end_ts, u64::MAX);
        let mut links = Vec::new();
        for entry in self.dependencies.range(from..=to) {
            let (_, value) = entry?;
            let mut snapshot: Vec<DependencyLink> = serde_json::from_slice(&value)?;
            links.append(&mut snapshot);
        }
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use spanbase_model::{KeyValue, Process, SpanId};

    fn store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SledStore::open(dir.path().join("db")).expect("open sled store");
        (dir, store)
    }

    fn span(trace: u64, id: u64) -> Span {
        Span {
            trace_id: TraceId::new(0, trace),
            span_id: SpanId::new(id),
            operation_name: "lookup".into(),
            references: vec![],
            flags: 1,
            start_time: Utc.with_ymd_and_hms(2017, 1, 26, 8, 0, 0).unwrap(),
            duration: TimeDelta::microseconds(1234),
            tags: vec![KeyValue::string("span.kind", "server")],
            logs: vec![],
            process: Process::new("inventory", vec![]),
        }
    }

    #[tokio::test]
    async fn span_roundtrip_preserves_every_field() {
        let (_dir, store) = store();
        let span = span(7, 1);
        store.write_span(&span).await.unwrap();
        store.flush().unwrap();

        let trace = store.get_trace(TraceId::new(0, 7)).await.unwrap();
        assert_eq!(trace.spans, vec![span]);
    }

    #[tokio::test]
    async fn duplicate_span_ids_are_both_kept() {
        let (_dir, store) = store();
        store.write_span(&span(7, 1)).await.unwrap();
        store.write_span(&span(7, 1)).await.unwrap();

        let trace = store.get_trace(TraceId::new(0, 7)).await.unwrap();
        assert_eq!(trace.spans.len(), 2);
    }

    #[tokio::test]
    async fn missing_trace_is_not_found() {
        let (_dir, store) = store();
        let err = store.get_trace(TraceId::ZERO).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn dependency_window_selects_by_snapshot_label() {
        let (_dir, store) = store();
        let now = Utc.with_ymd_and_hms(2017, 1, 26, 12, 0, 0).unwrap();
        store
            .write_dependencies(
                now - TimeDelta::minutes(30),
                vec![DependencyLink::new("old", "er", 1)],
            )
            .await
            .unwrap();
        store
            .write_dependencies(now, vec![DependencyLink::new("hello", "world", 1)])
            .await
            .unwrap();

        let links = store
            .get_dependencies(now, TimeDelta::minutes(5))
            .await
            .unwrap();
        assert_eq!(links, vec![DependencyLink::new("hello", "world", 1)]);
    }

    #[tokio::test]
    async fn purge_resets_the_database() {
        let (_dir, store) = store();
        store.write_span(&span(1, 1)).await.unwrap();
        store.purge().unwrap();
        assert!(store.get_services().await.unwrap().is_empty());
        assert!(store.get_trace(TraceId::new(0, 1)).await.is_err());
    }
}
