//! Declarative service configuration.
//!
//! The host process composes pipelines of receivers, processors and
//! exporters plus extensions out of a YAML document. This module only
//! models and validates that document; wiring the pieces together is the
//! host's job.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Result, StorageError};

/// Default capacity bound for a configured in-memory backend.
fn default_max_traces() -> usize {
    crate::memory::DEFAULT_MAX_TRACES
}

/// Top-level service configuration document.
#[derive(Debug, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub receivers: HashMap<String, ReceiverConfig>,
    #[serde(default)]
    pub extensions: ExtensionsConfig,
    #[serde(default)]
    pub pipelines: HashMap<String, PipelineConfig>,
}

impl ServiceConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|err| StorageError::InvalidQuery(format!("malformed configuration: {err}")))
    }

    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let yaml = std::fs::read_to_string(&path).map_err(|err| {
            StorageError::InvalidQuery(format!(
                "cannot read configuration {}: {err}",
                path.display()
            ))
        })?;
        Self::from_yaml(&yaml)
    }
}

/// One pipeline: receivers feed processors feed exporters, all by name.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub receivers: Vec<String>,
    #[serde(default)]
    pub processors: Vec<String>,
    #[serde(default)]
    pub exporters: Vec<String>,
}

/// Recognized extensions.
#[derive(Debug, Default, Deserialize)]
pub struct ExtensionsConfig {
    pub storage: Option<StorageExtension>,
    pub query: Option<QueryExtension>,
}

/// Enumerates named storage backends.
#[derive(Debug, Default, Deserialize)]
pub struct StorageExtension {
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
}

/// The query service extension: which backend serves reads, and where the
/// UI assets live.
#[derive(Debug, Deserialize)]
pub struct QueryExtension {
    pub trace_storage: String,
    #[serde(default)]
    pub trace_storage_archive: Option<String>,
    #[serde(default)]
    pub ui_config: Option<PathBuf>,
}

/// One configured storage backend.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendConfig {
    Memory(MemoryBackendConfig),
    Cassandra(CassandraBackendConfig),
    Opensearch(OpensearchBackendConfig),
    Sled(SledBackendConfig),
}

#[derive(Clone, Debug, Deserialize)]
pub struct MemoryBackendConfig {
    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        MemoryBackendConfig {
            max_traces: default_max_traces(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CassandraBackendConfig {
    pub keyspace: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpensearchBackendConfig {
    pub index_prefix: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SledBackendConfig {
    pub path: PathBuf,
}

/// One configured receiver.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverConfig {
    Otlp(OtlpReceiverConfig),
    Jaeger(JaegerReceiverConfig),
    Zipkin(ZipkinReceiverConfig),
    Kafka(KafkaReceiverConfig),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OtlpReceiverConfig {
    #[serde(default)]
    pub grpc_endpoint: Option<String>,
    #[serde(default)]
    pub http_endpoint: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct JaegerReceiverConfig {
    /// Enabled wire protocols: `grpc`, `thrift_binary`, `thrift_compact`,
    /// `thrift_http`.
    #[serde(default)]
    pub protocols: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ZipkinReceiverConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KafkaReceiverConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    #[serde(default)]
    pub encoding: SpanEncoding,
    #[serde(default)]
    pub initial_offset: InitialOffset,
}

/// How spans are encoded on a replay topic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanEncoding {
    #[default]
    Json,
    OtlpProto,
}

/// Where a fresh consumer starts on a replay topic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialOffset {
    Earliest,
    #[default]
    Latest,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
receivers:
  otlp:
    otlp:
      grpc_endpoint: 0.0.0.0:4317
      http_endpoint: 0.0.0.0:4318
  kafka:
    kafka:
      brokers: ["broker-1:9092", "broker-2:9092"]
      topic: spans
      encoding: json
      initial_offset: earliest
extensions:
  storage:
    backends:
      main_store:
        memory:
          max_traces: 50000
      durable_store:
        sled:
          path: /var/lib/spanbase
      remote_store:
        cassandra:
          keyspace: traces
          username: svc
          password: secret
  query:
    trace_storage: main_store
    trace_storage_archive: durable_store
    ui_config: /etc/spanbase/ui.json
pipelines:
  traces:
    receivers: [otlp, kafka]
    processors: [batch]
    exporters: [main_store]
"#;

    #[test]
    fn example_document_parses() {
        let config = ServiceConfig::from_yaml(EXAMPLE).unwrap();

        let storage = config.extensions.storage.unwrap();
        assert_eq!(storage.backends.len(), 3);
        match &storage.backends["main_store"] {
            BackendConfig::Memory(memory) => assert_eq!(memory.max_traces, 50_000),
            other => panic!("unexpected backend {other:?}"),
        }

        let query = config.extensions.query.unwrap();
        assert_eq!(query.trace_storage, "main_store");
        assert_eq!(query.trace_storage_archive.as_deref(), Some("durable_store"));

        match &config.receivers["kafka"] {
            ReceiverConfig::Kafka(kafka) => {
                assert_eq!(kafka.brokers.len(), 2);
                assert_eq!(kafka.encoding, SpanEncoding::Json);
                assert_eq!(kafka.initial_offset, InitialOffset::Earliest);
            }
            other => panic!("unexpected receiver {other:?}"),
        }

        assert_eq!(config.pipelines["traces"].receivers, vec!["otlp", "kafka"]);
    }

    #[test]
    fn memory_max_traces_defaults() {
        let config = ServiceConfig::from_yaml(
            "extensions:\n  storage:\n    backends:\n      m:\n        memory: {}\n",
        )
        .unwrap();
        match &config.extensions.storage.unwrap().backends["m"] {
            BackendConfig::Memory(memory) => {
                assert_eq!(memory.max_traces, crate::memory::DEFAULT_MAX_TRACES)
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn malformed_yaml_is_a_validation_error() {
        let err = ServiceConfig::from_yaml(":::").unwrap_err();
        assert!(matches!(err, StorageError::InvalidQuery(_)));
    }
}
