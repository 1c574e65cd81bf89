//! Wire contract of the remote sampling endpoint and the client that
//! consumes it.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Samples traces with a fixed probability in `[0.0, 1.0]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilisticSamplingStrategy {
    pub sampling_rate: f64,
}

/// Samples a fixed number of traces per second, typically implemented
/// client-side with a leaky bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitingSamplingStrategy {
    pub max_traces_per_second: i32,
}

/// Probabilistic strategy for one operation (span name).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSamplingStrategy {
    pub operation: String,
    pub probabilistic_sampling: ProbabilisticSamplingStrategy,
}

/// Per-operation strategies plus service-wide defaults, for services whose
/// endpoints see vastly different traffic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerOperationSamplingStrategies {
    pub default_sampling_probability: f64,
    /// Lower-bound rate limit guaranteeing a minimal trace flow for
    /// endpoints that probabilistic sampling would otherwise starve. Local
    /// to one service instance.
    pub default_lower_bound_traces_per_second: f64,
    pub per_operation_strategies: Vec<OperationSamplingStrategy>,
    #[serde(default)]
    pub default_upper_bound_traces_per_second: f64,
}

/// Discriminator kept for wire compatibility; consumers are expected to
/// check the strategy fields instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingStrategyType {
    Probabilistic,
    RateLimiting,
}

/// The overall sampling strategy for one service. Treated as a union:
/// exactly one of the strategy fields is meaningful.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingStrategyResponse {
    pub strategy_type: SamplingStrategyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilistic_sampling: Option<ProbabilisticSamplingStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limiting_sampling: Option<RateLimitingSamplingStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_sampling: Option<PerOperationSamplingStrategies>,
}

impl SamplingStrategyResponse {
    /// A plain probabilistic strategy.
    pub fn probabilistic(sampling_rate: f64) -> Self {
        SamplingStrategyResponse {
            strategy_type: SamplingStrategyType::Probabilistic,
            probabilistic_sampling: Some(ProbabilisticSamplingStrategy { sampling_rate }),
            rate_limiting_sampling: None,
            operation_sampling: None,
        }
    }
}

/// Restriction on one baggage key. The endpoint never serves these; the
/// type exists so the client surface stays wire-complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaggageRestriction {
    pub base_key: String,
    pub max_value_length: i32,
}

/// Minimal HTTP seam so callers bring their own client and runtime.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    async fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> std::result::Result<http::Response<Vec<u8>>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Errors from the sampling client. The messages are part of the wire
/// contract; remote callers match on them.
#[derive(Debug, Error)]
pub enum SamplingClientError {
    #[error("failed to get sampling strategy: {0}")]
    Fetch(String),

    #[error("baggage not implemented")]
    BaggageNotImplemented,
}

/// Client for a remote sampling strategy endpoint.
#[derive(Debug)]
pub struct SamplingClient<C> {
    client: C,
    endpoint: String,
}

impl<C: HttpClient> SamplingClient<C> {
    /// `endpoint` is the strategy URL without the service query parameter,
    /// e.g. `http://collector:5778/sampling`.
    pub fn new(client: C, endpoint: impl Into<String>) -> Self {
        SamplingClient {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Fetches the current strategy for a service.
    pub async fn get_sampling_strategy(
        &self,
        service_name: &str,
    ) -> std::result::Result<SamplingStrategyResponse, SamplingClientError> {
        let uri = format!("{}?service={}", self.endpoint, service_name);
        let request = http::Request::get(uri.as_str())
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Vec::new())
            .map_err(|err| SamplingClientError::Fetch(err.to_string()))?;

        let response = self
            .client
            .send(request)
            .await
            .map_err(|err| SamplingClientError::Fetch(err.to_string()))?;

        if response.status() != http::StatusCode::OK {
            return Err(SamplingClientError::Fetch(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        serde_json::from_slice(response.body())
            .map_err(|err| SamplingClientError::Fetch(err.to_string()))
    }

    /// Baggage restrictions are not part of this backend.
    pub async fn get_baggage_restrictions(
        &self,
        _service_name: &str,
    ) -> std::result::Result<Vec<BaggageRestriction>, SamplingClientError> {
        Err(SamplingClientError::BaggageNotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct StaticClient {
        status: http::StatusCode,
        body: &'static str,
    }

    #[async_trait]
    impl HttpClient for StaticClient {
        async fn send(
            &self,
            request: http::Request<Vec<u8>>,
        ) -> std::result::Result<http::Response<Vec<u8>>, Box<dyn std::error::Error + Send + Sync>>
        {
            assert!(request.uri().query().unwrap_or("").contains("service="));
            Ok(http::Response::builder()
                .status(self.status)
                .body(self.body.as_bytes().to_vec())
                .expect("static response"))
        }
    }

    #[tokio::test]
    async fn deserializes_a_probabilistic_response() {
        let client = SamplingClient::new(
            StaticClient {
                status: http::StatusCode::OK,
                body: r#"{
                    "strategyType": "PROBABILISTIC",
                    "probabilisticSampling": {"samplingRate": 0.5}
                }"#,
            },
            "http://localhost:5778/sampling",
        );

        let response = client.get_sampling_strategy("any").await.unwrap();
        assert_eq!(response.strategy_type, SamplingStrategyType::Probabilistic);
        assert_eq!(
            response.probabilistic_sampling.unwrap().sampling_rate,
            0.5
        );
    }

    #[tokio::test]
    async fn failures_carry_the_stable_prefix() {
        let client = SamplingClient::new(
            StaticClient {
                status: http::StatusCode::SERVICE_UNAVAILABLE,
                body: "",
            },
            "http://localhost:5778/sampling",
        );

        let err = client.get_sampling_strategy("any").await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to get sampling strategy"));
    }

    #[tokio::test]
    async fn baggage_is_not_implemented() {
        let client = SamplingClient::new(
            StaticClient {
                status: http::StatusCode::OK,
                body: "",
            },
            "http://localhost:5778/sampling",
        );

        let err = client.get_baggage_restrictions("foo").await.unwrap_err();
        assert_eq!(err.to_string(), "baggage not implemented");
    }

    #[test]
    fn rate_limiting_response_roundtrips() {
        let response = SamplingStrategyResponse {
            strategy_type: SamplingStrategyType::RateLimiting,
            probabilistic_sampling: None,
            rate_limiting_sampling: Some(RateLimitingSamplingStrategy {
                max_traces_per_second: 100,
            }),
            operation_sampling: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"RATE_LIMITING\""));
        assert!(json.contains("maxTracesPerSecond"));
        let back: SamplingStrategyResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
