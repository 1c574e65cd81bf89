//! Conformance run of the in-memory backend.

use std::sync::Arc;

use async_trait::async_trait;

use spanbase_storage::factory::{ArchiveHandles, Backend, DependencyHandles};
use spanbase_storage::memory::{MemorySamplingStore, MemoryStore};
use spanbase_storage::testing::{StorageIntegration, TestHooks};
use spanbase_storage::Result;

struct MemoryHooks {
    store: Arc<MemoryStore>,
    archive: Arc<MemoryStore>,
    sampling: Arc<MemorySamplingStore>,
}

#[async_trait]
impl TestHooks for MemoryHooks {
    async fn clean_up(&self) -> Result<()> {
        self.store.purge()?;
        self.archive.purge()?;
        self.sampling.purge()
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

fn memory_harness() -> StorageIntegration {
    let store = Arc::new(MemoryStore::new());
    let archive = Arc::new(MemoryStore::new());
    let sampling = Arc::new(MemorySamplingStore::new());

    let backend = Backend::builder(store.clone(), store.clone())
        .with_archive(ArchiveHandles {
            reader: archive.clone(),
            writer: archive.clone(),
        })
        .with_dependencies(DependencyHandles {
            reader: store.clone(),
            writer: store.clone(),
        })
        .with_sampling(sampling.clone())
        .build();

    StorageIntegration::new(
        &backend,
        Arc::new(MemoryHooks {
            store,
            archive,
            sampling,
        }),
    )
}

#[tokio::test]
async fn memory_storage_conformance() {
    memory_harness().run_all().await;
}

#[tokio::test]
async fn legacy_span_kind_flag_still_matches_names() {
    let mut harness = memory_harness();
    harness.get_operations_missing_span_kind = true;
    harness.test_get_operations().await;
}

#[tokio::test]
async fn skip_list_short_circuits_tests() {
    let mut harness = memory_harness();
    harness.skip_list = vec!["get_services".to_owned()];
    // would fail on an empty store if it actually ran
    harness.test_get_services().await;
}
