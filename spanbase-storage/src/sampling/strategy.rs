//! Serves sampling strategies to remote client samplers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::sampling::remote::{
    OperationSamplingStrategy, PerOperationSamplingStrategies, ProbabilisticSamplingStrategy,
    SamplingStrategyResponse,
};
use crate::samplingstore::SamplingStore;

/// Answers "how should this service sample" for client samplers.
#[async_trait]
pub trait StrategyProvider: Send + Sync {
    async fn get_sampling_strategy(&self, service_name: &str)
        -> Result<SamplingStrategyResponse>;
}

/// Serves per-operation probabilities out of the latest snapshot in the
/// sampling store, falling back to a fixed default for services the
/// recomputer has not seen yet.
#[derive(Debug)]
pub struct AdaptiveStrategyProvider {
    store: Arc<dyn SamplingStore>,
    default_sampling_probability: f64,
    lower_bound_traces_per_second: f64,
}

impl AdaptiveStrategyProvider {
    pub fn new(store: Arc<dyn SamplingStore>) -> Self {
        AdaptiveStrategyProvider {
            store,
            default_sampling_probability: 0.001,
            lower_bound_traces_per_second: 1.0 / 60.0,
        }
    }

    pub fn with_default_probability(mut self, probability: f64) -> Self {
        self.default_sampling_probability = probability;
        self
    }

    pub fn with_lower_bound(mut self, traces_per_second: f64) -> Self {
        self.lower_bound_traces_per_second = traces_per_second;
        self
    }
}

#[async_trait]
impl StrategyProvider for AdaptiveStrategyProvider {
    async fn get_sampling_strategy(
        &self,
        service_name: &str,
    ) -> Result<SamplingStrategyResponse> {
        let latest = self.store.get_latest_probabilities().await?;
        let operations = match latest.get(service_name) {
            Some(operations) if !operations.is_empty() => operations,
            _ => {
                return Ok(SamplingStrategyResponse::probabilistic(
                    self.default_sampling_probability,
                ))
            }
        };

        let mut strategies: Vec<OperationSamplingStrategy> = operations
            .iter()
            .map(|(operation, probability)| OperationSamplingStrategy {
                operation: operation.clone(),
                probabilistic_sampling: ProbabilisticSamplingStrategy {
                    sampling_rate: *probability,
                },
            })
            .collect();
        // deterministic response body
        strategies.sort_by(|a, b| a.operation.cmp(&b.operation));

        let mut response =
            SamplingStrategyResponse::probabilistic(self.default_sampling_probability);
        response.operation_sampling = Some(PerOperationSamplingStrategies {
            default_sampling_probability: self.default_sampling_probability,
            default_lower_bound_traces_per_second: self.lower_bound_traces_per_second,
            per_operation_strategies: strategies,
            default_upper_bound_traces_per_second: 0.0,
        });
        Ok(response)
    }
}
