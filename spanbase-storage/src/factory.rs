//! Capability façade aggregating the handles a backend offers.
//!
//! Every backend carries the mandatory span reader/writer pair. Optional
//! capabilities (archive namespace, dependency store, sampling store) are
//! probed once at construction and reported as absent without failing;
//! callers degrade instead of erroring. Composition over hierarchy: a
//! [`Backend`] is a plain value holding capability handles, not a type
//! family.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::{BackendConfig, MemoryBackendConfig};
use crate::dependencystore::{DependencyReader, DependencyWriter};
use crate::error::{Result, StorageError};
use crate::memory::{MemorySamplingStore, MemoryStore};
use crate::samplingstore::SamplingStore;
use crate::sledstore::SledStore;
use crate::spanstore::{SpanReader, SpanWriter};

/// Reader/writer pair targeting the long-retention archive namespace.
#[derive(Clone, Debug)]
pub struct ArchiveHandles {
    pub reader: Arc<dyn SpanReader>,
    pub writer: Arc<dyn SpanWriter>,
}

/// Dependency store handles.
#[derive(Clone, Debug)]
pub struct DependencyHandles {
    pub reader: Arc<dyn DependencyReader>,
    pub writer: Arc<dyn DependencyWriter>,
}

/// A storage backend as seen by the query engine and the write path.
#[derive(Clone, Debug)]
pub struct Backend {
    span_reader: Arc<dyn SpanReader>,
    span_writer: Arc<dyn SpanWriter>,
    archive: Option<ArchiveHandles>,
    dependencies: Option<DependencyHandles>,
    sampling: Option<Arc<dyn SamplingStore>>,
}

impl Backend {
    pub fn builder(
        span_reader: Arc<dyn SpanReader>,
        span_writer: Arc<dyn SpanWriter>,
    ) -> BackendBuilder {
        BackendBuilder {
            backend: Backend {
                span_reader,
                span_writer,
                archive: None,
                dependencies: None,
                sampling: None,
            },
        }
    }

    /// A fully capable in-memory backend: primary and archive namespaces,
    /// dependencies and sampling.
    pub fn in_memory(config: MemoryBackendConfig) -> Backend {
        let primary = Arc::new(MemoryStore::with_max_traces(config.max_traces));
        let archive = Arc::new(MemoryStore::with_max_traces(config.max_traces));
        Backend::builder(primary.clone(), primary.clone())
            .with_archive(ArchiveHandles {
                reader: archive.clone(),
                writer: archive,
            })
            .with_dependencies(DependencyHandles {
                reader: primary.clone(),
                writer: primary,
            })
            .with_sampling(Arc::new(MemorySamplingStore::new()))
            .build()
    }

    /// A durable sled-backed backend: spans and dependencies, no archive
    /// namespace and no sampling store.
    pub fn sled(path: impl AsRef<Path>) -> Result<Backend> {
        let store = Arc::new(SledStore::open(path)?);
        Ok(Backend::builder(store.clone(), store.clone())
            .with_dependencies(DependencyHandles {
                reader: store.clone(),
                writer: store,
            })
            .build())
    }

    /// Builds the backend a declarative configuration entry describes.
    ///
    /// Backends whose drivers live outside this process report
    /// [`StorageError::Unsupported`] naming the missing driver.
    pub fn from_config(config: &BackendConfig) -> Result<Backend> {
        match config {
            BackendConfig::Memory(memory) => Ok(Backend::in_memory(memory.clone())),
            BackendConfig::Sled(sled) => Backend::sled(&sled.path),
            BackendConfig::Cassandra(_) => Err(StorageError::Unsupported(
                "cassandra driver is not bundled; the cluster is an external collaborator",
            )),
            BackendConfig::Opensearch(_) => Err(StorageError::Unsupported(
                "opensearch driver is not bundled; the cluster is an external collaborator",
            )),
        }
    }

    /// Builds every backend named in the storage extension, skipping the
    /// ones whose drivers are external.
    pub fn registry_from_config(
        backends: &HashMap<String, BackendConfig>,
    ) -> Result<HashMap<String, Backend>> {
        let mut registry = HashMap::new();
        for (name, config) in backends {
            match Backend::from_config(config) {
                Ok(backend) => {
                    registry.insert(name.clone(), backend);
                }
                Err(StorageError::Unsupported(reason)) => {
                    info!(backend = %name, reason, "skipping externally hosted backend");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(registry)
    }

    pub fn span_reader(&self) -> Arc<dyn SpanReader> {
        self.span_reader.clone()
    }

    pub fn span_writer(&self) -> Arc<dyn SpanWriter> {
        self.span_writer.clone()
    }

    /// The archive namespace, when this backend has one.
    pub fn archive(&self) -> Option<&ArchiveHandles> {
        self.archive.as_ref()
    }

    /// Like [`Backend::archive`] but with the distinguishable sentinel for
    /// callers that need an error to propagate.
    pub fn archive_or_unsupported(&self) -> Result<&ArchiveHandles> {
        self.archive.as_ref().ok_or(StorageError::ArchiveNotSupported)
    }

    pub fn dependencies(&self) -> Option<&DependencyHandles> {
        self.dependencies.as_ref()
    }

    pub fn sampling(&self) -> Option<Arc<dyn SamplingStore>> {
        self.sampling.clone()
    }
}

/// Assembles a [`Backend`] from capability handles.
#[derive(Debug)]
pub struct BackendBuilder {
    backend: Backend,
}

impl BackendBuilder {
    pub fn with_archive(mut self, archive: ArchiveHandles) -> Self {
        self.backend.archive = Some(archive);
        self
    }

    pub fn with_dependencies(mut self, dependencies: DependencyHandles) -> Self {
        self.backend.dependencies = Some(dependencies);
        self
    }

    pub fn with_sampling(mut self, sampling: Arc<dyn SamplingStore>) -> Self {
        self.backend.sampling = Some(sampling);
        self
    }

    pub fn build(self) -> Backend {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CassandraBackendConfig;

    #[test]
    fn memory_backend_has_every_capability() {
        let backend = Backend::in_memory(MemoryBackendConfig::default());
        assert!(backend.archive().is_some());
        assert!(backend.dependencies().is_some());
        assert!(backend.sampling().is_some());
    }

    #[test]
    fn sled_backend_reports_absent_capabilities_benignly() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = Backend::sled(dir.path().join("db")).expect("open backend");
        assert!(backend.archive().is_none());
        assert!(backend.sampling().is_none());
        assert!(matches!(
            backend.archive_or_unsupported(),
            Err(StorageError::ArchiveNotSupported)
        ));
    }

    #[test]
    fn external_drivers_are_unsupported_not_fatal() {
        let config = BackendConfig::Cassandra(CassandraBackendConfig {
            keyspace: "traces".into(),
            username: "svc".into(),
            password: "secret".into(),
        });
        assert!(matches!(
            Backend::from_config(&config),
            Err(StorageError::Unsupported(_))
        ));

        let registry = Backend::registry_from_config(&HashMap::from([(
            "remote".to_owned(),
            config,
        )]))
        .expect("registry");
        assert!(registry.is_empty());
    }
}
