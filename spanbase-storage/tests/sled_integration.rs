//! Conformance run of the sled-backed durable backend.

use std::sync::Arc;

use async_trait::async_trait;

use spanbase_storage::factory::{Backend, DependencyHandles};
use spanbase_storage::sledstore::SledStore;
use spanbase_storage::testing::{StorageIntegration, TestHooks};
use spanbase_storage::Result;

struct SledHooks {
    store: Arc<SledStore>,
}

#[async_trait]
impl TestHooks for SledHooks {
    async fn clean_up(&self) -> Result<()> {
        self.store.purge()
    }

    async fn refresh(&self) -> Result<()> {
        self.store.flush()
    }
}

#[tokio::test]
async fn sled_storage_conformance() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = Arc::new(SledStore::open(dir.path().join("db")).expect("open sled store"));

    let backend = Backend::builder(store.clone(), store.clone())
        .with_dependencies(DependencyHandles {
            reader: store.clone(),
            writer: store.clone(),
        })
        .build();

    // archive and sampling capabilities are absent on this backend; the
    // harness records that and moves on
    let harness = StorageIntegration::new(&backend, Arc::new(SledHooks { store }));
    harness.run_all().await;
}
