//! Read-side service layering validation, adjusters and deterministic
//! ordering on top of any [`SpanReader`].

use std::sync::Arc;

use spanbase_model::adjuster::AdjusterPipeline;
use spanbase_model::{Trace, TraceId};

use crate::error::{Result, StorageError};
use crate::spanstore::{
    sort_and_limit, Operation, OperationQueryParameters, SpanReader, TraceQueryParameters,
};

/// The query engine.
///
/// Every trace leaving this service has passed the adjuster pipeline, so
/// heterogeneous backends present one canonical shape. Trace ordering is
/// fixed here regardless of what the backend returned: most recent span
/// start first, ties broken by trace id ascending.
#[derive(Debug)]
pub struct QueryService {
    reader: Arc<dyn SpanReader>,
    adjusters: AdjusterPipeline,
}

impl QueryService {
    /// Wraps a reader with the standard adjuster pipeline.
    pub fn new(reader: Arc<dyn SpanReader>) -> Self {
        QueryService {
            reader,
            adjusters: AdjusterPipeline::standard(),
        }
    }

    /// Wraps a reader with a caller-supplied pipeline.
    pub fn with_adjusters(reader: Arc<dyn SpanReader>, adjusters: AdjusterPipeline) -> Self {
        QueryService { reader, adjusters }
    }

    /// The full trace, canonicalized.
    pub async fn get_trace(&self, trace_id: TraceId) -> Result<Trace> {
        let mut trace = self.reader.get_trace(trace_id).await?;
        self.adjusters.adjust(&mut trace);
        Ok(trace)
    }

    /// Distinct service names, sorted for stable presentation.
    pub async fn get_services(&self) -> Result<Vec<String>> {
        let mut services = self.reader.get_services().await?;
        services.sort();
        Ok(services)
    }

    /// Operations of a service, sorted by name then kind.
    pub async fn get_operations(
        &self,
        query: &OperationQueryParameters,
    ) -> Result<Vec<Operation>> {
        if query.service_name.is_empty() {
            return Err(StorageError::InvalidQuery(
                "service name must not be empty".into(),
            ));
        }
        let mut operations = self.reader.get_operations(query).await?;
        operations.sort_by(|a, b| a.name.cmp(&b.name).then(a.span_kind.cmp(&b.span_kind)));
        Ok(operations)
    }

    /// Matching traces, canonicalized, ordered and capped.
    pub async fn find_traces(&self, query: &TraceQueryParameters) -> Result<Vec<Trace>> {
        query.validate()?;
        let mut traces = self.reader.find_traces(query).await?;
        for trace in &mut traces {
            self.adjusters.adjust(trace);
        }
        sort_and_limit(&mut traces, query.num_traces);
        Ok(traces)
    }

    /// Matching trace ids in the same order [`QueryService::find_traces`]
    /// would return the traces.
    pub async fn find_trace_ids(&self, query: &TraceQueryParameters) -> Result<Vec<TraceId>> {
        query.validate()?;
        self.reader.find_trace_ids(query).await
    }
}
