//! Reusable conformance harness for storage backends.
//!
//! Every backend implementation is driven through the same golden fixtures
//! and contract checks. A backend under test supplies its capability
//! handles plus two lifecycle hooks; the harness does the rest:
//!
//! ```no_run
//! # async fn example() {
//! use std::sync::Arc;
//! use spanbase_storage::config::MemoryBackendConfig;
//! use spanbase_storage::factory::Backend;
//! use spanbase_storage::testing::{StorageIntegration, TestHooks};
//!
//! # #[derive(Debug)] struct Hooks;
//! # #[async_trait::async_trait]
//! # impl TestHooks for Hooks {
//! #     async fn clean_up(&self) -> spanbase_storage::Result<()> { Ok(()) }
//! #     async fn refresh(&self) -> spanbase_storage::Result<()> { Ok(()) }
//! # }
//! let backend = Backend::in_memory(MemoryBackendConfig::default());
//! let harness = StorageIntegration::new(&backend, Arc::new(Hooks));
//! harness.run_all().await;
//! # }
//! ```
//!
//! Fixtures are embedded read-only; their literal dates are rewritten at
//! load time (`2017-01-26` becomes yesterday, `2017-01-25` two days ago,
//! both UTC) so the queries always cover recent data. Reads after writes
//! poll for up to 100 seconds to tolerate asynchronous indexers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use spanbase_model::{
    DependencyLink, Process, ServiceOperationProbabilities, ServiceOperationQps, Span, SpanId,
    Throughput, Trace, TraceId, DEPENDENCY_LINK_SOURCE,
};

use crate::dependencystore::{DependencyReader, DependencyWriter};
use crate::error::Result;
use crate::factory::Backend;
use crate::samplingstore::SamplingStore;
use crate::spanstore::{Operation, OperationQueryParameters, SpanReader, SpanWriter, TraceQueryParameters};

const WAIT_ITERATIONS: usize = 100;
const LARGE_TRACE_SPAN_COUNT: usize = 10_008;

const EXAMPLE_TRACE: &str = include_str!("fixtures/traces/example_trace.json");
const TAGS_TRACE: &str = include_str!("fixtures/traces/tags_trace.json");
const DURATION_TRACE: &str = include_str!("fixtures/traces/duration_trace.json");
const QUERIES: &str = include_str!("fixtures/queries.json");

/// Lifecycle hooks a backend supplies to the harness.
#[async_trait]
pub trait TestHooks: Send + Sync {
    /// Resets the backend to an empty state. Called between tests; must be
    /// idempotent.
    async fn clean_up(&self) -> Result<()>;

    /// Best-effort flush/commit so subsequent reads observe prior writes.
    async fn refresh(&self) -> Result<()>;
}

/// One query conformance case from `fixtures/queries.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFixture {
    pub caption: String,
    pub query: TraceQueryParameters,
    pub expected_fixtures: Vec<String>,
}

/// Drives a backend through the storage conformance suite.
pub struct StorageIntegration {
    pub span_writer: Arc<dyn SpanWriter>,
    pub span_reader: Arc<dyn SpanReader>,
    pub archive_span_writer: Option<Arc<dyn SpanWriter>>,
    pub archive_span_reader: Option<Arc<dyn SpanReader>>,
    pub dependency_writer: Option<Arc<dyn DependencyWriter>>,
    pub dependency_reader: Option<Arc<dyn DependencyReader>>,
    pub sampling_store: Option<Arc<dyn SamplingStore>>,
    pub hooks: Arc<dyn TestHooks>,

    /// Test names (substring patterns) to skip on backends with known
    /// limitations.
    pub skip_list: Vec<String>,
    /// Set by backends that do not store the span kind per operation.
    pub get_operations_missing_span_kind: bool,
    /// Set by backends that return the provenance column on dependencies.
    pub get_dependencies_returns_source: bool,
}

/// Rewrites the fixture dates so queries always target recent data. The
/// replacement is textual on the raw JSON, before parsing.
fn correct_dates(raw: &str) -> String {
    let now = Utc::now();
    let yesterday = (now - TimeDelta::days(1)).format("%Y-%m-%d").to_string();
    let two_days_ago = (now - TimeDelta::days(2)).format("%Y-%m-%d").to_string();
    raw.replace("2017-01-26", &yesterday)
        .replace("2017-01-25", &two_days_ago)
}

/// Loads a trace fixture by name.
pub fn trace_fixture(name: &str) -> Trace {
    let raw = match name {
        "example_trace" => EXAMPLE_TRACE,
        "tags_trace" => TAGS_TRACE,
        "duration_trace" => DURATION_TRACE,
        other => panic!("unknown trace fixture {other:?}"),
    };
    serde_json::from_str(&correct_dates(raw))
        .unwrap_or_else(|err| panic!("trace fixture {name} failed to parse: {err}"))
}

/// Loads the query conformance cases.
pub fn query_fixtures() -> Vec<QueryFixture> {
    serde_json::from_str(&correct_dates(QUERIES)).expect("query fixtures failed to parse")
}

async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for iteration in 0..WAIT_ITERATIONS {
        if condition().await {
            return true;
        }
        debug!(
            iteration = iteration + 1,
            total = WAIT_ITERATIONS,
            "waiting for storage backend to apply writes"
        );
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
    condition().await
}

fn span_count(traces: &[Trace]) -> usize {
    traces.iter().map(|trace| trace.spans.len()).sum()
}

impl StorageIntegration {
    /// Builds a harness from a backend's capability set.
    pub fn new(backend: &Backend, hooks: Arc<dyn TestHooks>) -> Self {
        StorageIntegration {
            span_writer: backend.span_writer(),
            span_reader: backend.span_reader(),
            archive_span_writer: backend.archive().map(|archive| archive.writer.clone()),
            archive_span_reader: backend.archive().map(|archive| archive.reader.clone()),
            dependency_writer: backend.dependencies().map(|deps| deps.writer.clone()),
            dependency_reader: backend.dependencies().map(|deps| deps.reader.clone()),
            sampling_store: backend.sampling(),
            hooks,
            skip_list: Vec::new(),
            get_operations_missing_span_kind: false,
            get_dependencies_returns_source: true,
        }
    }

    fn should_skip(&self, test_name: &str) -> bool {
        for pattern in &self.skip_list {
            let matcher = regex::Regex::new(&regex::escape(pattern)).expect("escaped pattern");
            if matcher.is_match(test_name) {
                info!(test = test_name, pattern = %pattern, "skipping per skip list");
                return true;
            }
        }
        false
    }

    async fn clean_up(&self) {
        self.hooks.clean_up().await.expect("clean_up hook failed");
    }

    async fn refresh(&self) {
        self.hooks.refresh().await.expect("refresh hook failed");
    }

    async fn write_trace(&self, trace: &Trace) {
        for span in &trace.spans {
            self.span_writer
                .write_span(span)
                .await
                .expect("writing fixture span failed");
        }
    }

    async fn write_example_trace(&self) -> Trace {
        let trace = trace_fixture("example_trace");
        self.write_trace(&trace).await;
        trace
    }

    /// Clones the first fixture span into a trace of 10 008 spans with
    /// ascending span ids and start times.
    fn large_trace() -> Trace {
        let template = trace_fixture("example_trace").spans.remove(0);
        let mut spans = Vec::with_capacity(LARGE_TRACE_SPAN_COUNT);
        spans.push(template.clone());
        for i in 1..LARGE_TRACE_SPAN_COUNT {
            let mut span = template.clone();
            span.span_id = SpanId::new(i as u64);
            span.start_time = template.start_time + TimeDelta::seconds(i as i64 + 1);
            spans.push(span);
        }
        Trace::new(spans)
    }

    pub async fn test_get_services(&self) {
        if self.should_skip("get_services") {
            return;
        }
        let expected = vec![
            "example-service-1".to_owned(),
            "example-service-2".to_owned(),
            "example-service-3".to_owned(),
        ];
        self.write_example_trace().await;
        self.refresh().await;

        let reader = self.span_reader.clone();
        let wanted = expected.clone();
        let found = eventually(move || {
            let reader = reader.clone();
            let wanted = wanted.clone();
            async move {
                match reader.get_services().await {
                    Ok(mut services) => {
                        services.sort();
                        services == wanted
                    }
                    Err(_) => false,
                }
            }
        })
        .await;
        assert!(found, "get_services never returned {expected:?}");
        self.clean_up().await;
    }

    pub async fn test_get_operations(&self) {
        if self.should_skip("get_operations") {
            return;
        }
        let expected: Vec<Operation> = if self.get_operations_missing_span_kind {
            ["example-operation-1", "example-operation-3", "example-operation-4"]
                .iter()
                .map(|name| Operation {
                    name: (*name).to_owned(),
                    span_kind: None,
                })
                .collect()
        } else {
            vec![
                Operation {
                    name: "example-operation-1".to_owned(),
                    span_kind: Some(spanbase_model::SpanKind::Unspecified),
                },
                Operation {
                    name: "example-operation-3".to_owned(),
                    span_kind: Some(spanbase_model::SpanKind::Server),
                },
                Operation {
                    name: "example-operation-4".to_owned(),
                    span_kind: Some(spanbase_model::SpanKind::Client),
                },
            ]
        };
        self.write_example_trace().await;
        self.refresh().await;

        let reader = self.span_reader.clone();
        let missing_kind = self.get_operations_missing_span_kind;
        let wanted = expected.clone();
        let found = eventually(move || {
            let reader = reader.clone();
            let wanted = wanted.clone();
            async move {
                let query = OperationQueryParameters::for_service("example-service-1");
                match reader.get_operations(&query).await {
                    Ok(mut operations) => {
                        if missing_kind {
                            for operation in &mut operations {
                                operation.span_kind = None;
                            }
                        }
                        operations.sort_by(|a, b| a.name.cmp(&b.name));
                        operations == wanted
                    }
                    Err(_) => false,
                }
            }
        })
        .await;
        assert!(found, "get_operations never returned {expected:?}");
        self.clean_up().await;
    }

    pub async fn test_get_trace(&self) {
        if self.should_skip("get_trace") {
            return;
        }
        let expected = self.write_example_trace().await;
        let trace_id = expected.spans[0].trace_id;
        self.refresh().await;

        let reader = self.span_reader.clone();
        let expected_len = expected.spans.len();
        let found = eventually(move || {
            let reader = reader.clone();
            async move {
                matches!(
                    reader.get_trace(trace_id).await,
                    Ok(trace) if trace.spans.len() == expected_len
                )
            }
        })
        .await;
        assert!(found, "get_trace never returned the full trace");

        // round trip must preserve every span field
        let mut actual = self
            .span_reader
            .get_trace(trace_id)
            .await
            .expect("trace readable after convergence");
        let mut wanted = expected.clone();
        actual.spans.sort_by_key(|span| span.span_id);
        wanted.spans.sort_by_key(|span| span.span_id);
        assert_eq!(actual.spans, wanted.spans);

        // zero id is the canonical not-found probe, whatever is stored
        let err = self
            .span_reader
            .get_trace(TraceId::ZERO)
            .await
            .expect_err("zero trace id must not resolve");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "trace not found");

        self.clean_up().await;
    }

    pub async fn test_get_large_trace(&self) {
        if self.should_skip("get_large_trace") {
            return;
        }
        let expected = Self::large_trace();
        let trace_id = expected.spans[0].trace_id;
        self.write_trace(&expected).await;
        self.refresh().await;

        let reader = self.span_reader.clone();
        let expected_len = expected.spans.len();
        let found = eventually(move || {
            let reader = reader.clone();
            async move {
                matches!(
                    reader.get_trace(trace_id).await,
                    Ok(trace) if trace.spans.len() == expected_len
                )
            }
        })
        .await;
        assert!(found, "large trace never returned all {expected_len} spans");
        self.clean_up().await;
    }

    pub async fn test_find_traces(&self) {
        if self.should_skip("find_traces") {
            return;
        }
        let cases = query_fixtures();

        // store every fixture up front: each case then runs against all
        // other cases' traces as counterexamples
        let mut written: Vec<String> = Vec::new();
        let mut expected_per_case: Vec<Vec<Trace>> = Vec::new();
        for case in &cases {
            let mut expected = Vec::new();
            for fixture_name in &case.expected_fixtures {
                let trace = trace_fixture(fixture_name);
                if !written.contains(fixture_name) {
                    self.write_trace(&trace).await;
                    written.push(fixture_name.clone());
                }
                expected.push(trace);
            }
            expected_per_case.push(expected);
        }
        self.refresh().await;

        for (case, expected) in cases.iter().zip(&expected_per_case) {
            if self.should_skip(&format!("find_traces/{}", case.caption)) {
                continue;
            }
            let reader = self.span_reader.clone();
            let query = case.query.clone();
            let expected_len = expected.len();
            let found = eventually(move || {
                let reader = reader.clone();
                let query = query.clone();
                async move {
                    matches!(
                        reader.find_traces(&query).await,
                        Ok(traces) if traces.len() == expected_len
                    )
                }
            })
            .await;
            assert!(found, "case {:?} never returned {} traces", case.caption, expected.len());

            let actual = self
                .span_reader
                .find_traces(&case.query)
                .await
                .expect("query succeeds after convergence");
            assert_eq!(
                span_count(&actual),
                span_count(expected),
                "case {:?} returned the wrong spans",
                case.caption
            );
        }
        self.clean_up().await;
    }

    pub async fn test_archive_trace(&self) {
        if self.should_skip("archive_trace") {
            return;
        }
        let (writer, reader) = match (&self.archive_span_writer, &self.archive_span_reader) {
            (Some(writer), Some(reader)) => (writer.clone(), reader.clone()),
            _ => {
                info!("archive storage not supported by this backend");
                return;
            }
        };

        let trace_id = TraceId::new(11, 22);
        let span = Span {
            trace_id,
            span_id: SpanId::new(55),
            operation_name: "archive_span".to_owned(),
            references: vec![],
            flags: 0,
            start_time: Utc::now() - TimeDelta::days(15),
            duration: TimeDelta::milliseconds(5),
            tags: vec![],
            logs: vec![],
            process: Process::new("archived_service", vec![]),
        };
        writer.write_span(&span).await.expect("archive write failed");
        self.refresh().await;

        let probe = reader.clone();
        let found = eventually(move || {
            let probe = probe.clone();
            async move {
                matches!(
                    probe.get_trace(trace_id).await,
                    Ok(trace) if trace.spans.len() == 1
                )
            }
        })
        .await;
        assert!(found, "archived trace never became readable");
        self.clean_up().await;
    }

    pub async fn test_get_dependencies(&self) {
        if self.should_skip("get_dependencies") {
            return;
        }
        let (writer, reader) = match (&self.dependency_writer, &self.dependency_reader) {
            (Some(writer), Some(reader)) => (writer.clone(), reader.clone()),
            _ => {
                info!("dependency storage not supported by this backend");
                return;
            }
        };

        let source = if self.get_dependencies_returns_source {
            DEPENDENCY_LINK_SOURCE.to_owned()
        } else {
            String::new()
        };
        let expected = vec![
            DependencyLink {
                parent: "hello".to_owned(),
                child: "world".to_owned(),
                call_count: 1,
                source: source.clone(),
            },
            DependencyLink {
                parent: "world".to_owned(),
                child: "hello".to_owned(),
                call_count: 3,
                source,
            },
        ];
        let now = Utc::now();
        writer
            .write_dependencies(now, expected.clone())
            .await
            .expect("dependency write failed");
        self.refresh().await;

        let mut actual = reader
            .get_dependencies(now, TimeDelta::minutes(5))
            .await
            .expect("dependency read failed");
        actual.sort_by(|a, b| a.parent.cmp(&b.parent));
        assert_eq!(actual, expected);
        self.clean_up().await;
    }

    pub async fn test_get_throughput(&self) {
        if self.should_skip("get_throughput") {
            return;
        }
        let store = match &self.sampling_store {
            Some(store) => store.clone(),
            None => {
                info!("sampling storage not supported by this backend");
                return;
            }
        };
        let start = Utc::now();

        store
            .insert_throughput(vec![
                Throughput::new("my-svc", "op", 1),
                Throughput::new("our-svc", "op2", 1),
            ])
            .await
            .expect("throughput insert failed");
        self.refresh().await;

        let probe = store.clone();
        let found = eventually(move || {
            let probe = probe.clone();
            async move {
                matches!(
                    probe.get_throughput(start, start + TimeDelta::seconds(10)).await,
                    Ok(rows) if rows.len() == 2
                )
            }
        })
        .await;
        assert!(found, "throughput rows never became readable");
        self.clean_up().await;
    }

    pub async fn test_get_latest_probabilities(&self) {
        if self.should_skip("get_latest_probabilities") {
            return;
        }
        let store = match &self.sampling_store {
            Some(store) => store.clone(),
            None => {
                info!("sampling storage not supported by this backend");
                return;
            }
        };

        store
            .insert_probabilities_and_qps(
                "newhostname1",
                ServiceOperationProbabilities::from([(
                    "new-srv3".to_owned(),
                    [("op".to_owned(), 0.123)].into(),
                )]),
                ServiceOperationQps::from([(
                    "new-srv2".to_owned(),
                    [("op".to_owned(), 11.0)].into(),
                )]),
            )
            .await
            .expect("probability insert failed");
        store
            .insert_probabilities_and_qps(
                "dell11eg843d",
                ServiceOperationProbabilities::from([(
                    "new-srv".to_owned(),
                    [("op".to_owned(), 0.1)].into(),
                )]),
                ServiceOperationQps::from([(
                    "new-srv".to_owned(),
                    [("op".to_owned(), 4.0)].into(),
                )]),
            )
            .await
            .expect("probability insert failed");
        self.refresh().await;

        let expected = ServiceOperationProbabilities::from([(
            "new-srv".to_owned(),
            [("op".to_owned(), 0.1)].into(),
        )]);
        let probe = store.clone();
        let wanted = expected.clone();
        let found = eventually(move || {
            let probe = probe.clone();
            let wanted = wanted.clone();
            async move {
                matches!(
                    probe.get_latest_probabilities().await,
                    Ok(latest) if latest == wanted
                )
            }
        })
        .await;
        assert!(
            found,
            "latest probabilities never converged to {expected:?}"
        );
        self.clean_up().await;
    }

    /// Runs the whole conformance suite in a fixed order.
    pub async fn run_all(&self) {
        self.clean_up().await;
        self.test_get_services().await;
        self.test_get_operations().await;
        self.test_get_trace().await;
        self.test_get_large_trace().await;
        self.test_find_traces().await;
        self.test_archive_trace().await;
        self.test_get_dependencies().await;
        self.test_get_throughput().await;
        self.test_get_latest_probabilities().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_dates_are_rewritten_before_parse() {
        let trace = trace_fixture("example_trace");
        let yesterday = (Utc::now() - TimeDelta::days(1)).date_naive();
        let two_days_ago = (Utc::now() - TimeDelta::days(2)).date_naive();

        assert_eq!(trace.spans[0].start_time.date_naive(), yesterday);
        let oldest = trace.spans.last().expect("fixture has spans");
        assert_eq!(oldest.start_time.date_naive(), two_days_ago);
    }

    #[test]
    fn query_fixtures_parse_with_defaults() {
        let cases = query_fixtures();
        assert!(cases.len() >= 5);
        assert_eq!(cases[0].query.num_traces, crate::spanstore::DEFAULT_NUM_TRACES);
        assert!(cases.iter().any(|case| !case.query.tags.is_empty()));
    }

    #[test]
    fn large_trace_has_ascending_span_ids_and_start_times() {
        let trace = StorageIntegration::large_trace();
        assert_eq!(trace.spans.len(), LARGE_TRACE_SPAN_COUNT);
        assert_eq!(trace.spans[1].span_id, SpanId::new(1));
        assert!(trace.spans[2].start_time > trace.spans[1].start_time);
        assert!(trace
            .spans
            .iter()
            .all(|span| span.trace_id == trace.spans[0].trace_id));
    }
}
