//! Durable cluster state storage: which task executors are registered and
//! their last-known slot reports, so a freshly-elected resource manager can
//! rebuild its view rather than starting from nothing. "Internal state
//! cleared on becoming leader" applies to in-memory caches, not this
//! durable layer. Two implementations: `InMemoryClusterState` for tests and
//! single-process deployments, `SledClusterState` for a durable embedded
//! store that survives a resource manager restart.

use async_trait::async_trait;
use conduit_core::error::Result;
use conduit_core::ids::ResourceId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutorRecord {
    pub resource_id: ResourceId,
    pub address: String,
    pub total_slots: u32,
}

/// Durable store of registered-executor records. A narrow, single-keyspace
/// slice of key/value access — the full multi-keyspace transactional
/// `KeyValueStore` surface belongs to whichever job-state store
/// `conduit-scheduler` uses for job metadata.
#[async_trait]
pub trait ClusterState: Send + Sync {
    async fn put_executor(&self, record: ExecutorRecord) -> Result<()>;
    async fn remove_executor(&self, resource_id: &ResourceId) -> Result<()>;
    async fn get_executor(&self, resource_id: &ResourceId) -> Result<Option<ExecutorRecord>>;
    async fn list_executors(&self) -> Result<Vec<ExecutorRecord>>;
}

#[derive(Default)]
pub struct InMemoryClusterState {
    executors: DashMap<ResourceId, ExecutorRecord>,
}

impl InMemoryClusterState {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }
}

#[async_trait]
impl ClusterState for InMemoryClusterState {
    async fn put_executor(&self, record: ExecutorRecord) -> Result<()> {
        self.executors.insert(record.resource_id.clone(), record);
        Ok(())
    }

    async fn remove_executor(&self, resource_id: &ResourceId) -> Result<()> {
        self.executors.remove(resource_id);
        Ok(())
    }

    async fn get_executor(&self, resource_id: &ResourceId) -> Result<Option<ExecutorRecord>> {
        Ok(self.executors.get(resource_id).map(|e| e.clone()))
    }

    async fn list_executors(&self) -> Result<Vec<ExecutorRecord>> {
        Ok(self.executors.iter().map(|e| e.value().clone()).collect())
    }
}

/// Durable, crash-recoverable `ClusterState` backed by a `sled::Tree`
/// keyed by resource id, values JSON-encoded. `sled`'s own API is
/// synchronous, so every operation runs on the blocking-task pool rather
/// than tying up the async runtime's worker threads.
#[cfg(feature = "sled-cluster")]
pub struct SledClusterState {
    tree: sled::Tree,
}

#[cfg(feature = "sled-cluster")]
impl SledClusterState {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<std::sync::Arc<Self>> {
        let db = sled::open(path).map_err(|e| conduit_core::error::ConduitError::internal(format!("opening sled db: {e}")))?;
        let tree = db.open_tree("executors").map_err(|e| conduit_core::error::ConduitError::internal(format!("opening executors tree: {e}")))?;
        Ok(std::sync::Arc::new(Self { tree }))
    }
}

#[cfg(feature = "sled-cluster")]
#[async_trait]
impl ClusterState for SledClusterState {
    async fn put_executor(&self, record: ExecutorRecord) -> Result<()> {
        let tree = self.tree.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let bytes = serde_json::to_vec(&record).map_err(|e| conduit_core::error::ConduitError::internal(format!("encoding executor record: {e}")))?;
            tree.insert(record.resource_id.as_str(), bytes)
                .map_err(|e| conduit_core::error::ConduitError::internal(format!("sled insert: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| conduit_core::error::ConduitError::internal(format!("blocking task join: {e}")))??;
        Ok(())
    }

    async fn remove_executor(&self, resource_id: &ResourceId) -> Result<()> {
        let tree = self.tree.clone();
        let key = resource_id.as_str().to_owned();
        tokio::task::spawn_blocking(move || -> Result<()> {
            tree.remove(key).map_err(|e| conduit_core::error::ConduitError::internal(format!("sled remove: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| conduit_core::error::ConduitError::internal(format!("blocking task join: {e}")))??;
        Ok(())
    }

    async fn get_executor(&self, resource_id: &ResourceId) -> Result<Option<ExecutorRecord>> {
        let tree = self.tree.clone();
        let key = resource_id.as_str().to_owned();
        tokio::task::spawn_blocking(move || -> Result<Option<ExecutorRecord>> {
            match tree.get(key).map_err(|e| conduit_core::error::ConduitError::internal(format!("sled get: {e}")))? {
                Some(bytes) => {
                    let record = serde_json::from_slice(&bytes).map_err(|e| conduit_core::error::ConduitError::internal(format!("decoding executor record: {e}")))?;
                    Ok(Some(record))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| conduit_core::error::ConduitError::internal(format!("blocking task join: {e}")))?
    }

    async fn list_executors(&self) -> Result<Vec<ExecutorRecord>> {
        let tree = self.tree.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ExecutorRecord>> {
            tree.iter()
                .values()
                .map(|v| {
                    let bytes = v.map_err(|e| conduit_core::error::ConduitError::internal(format!("sled scan: {e}")))?;
                    serde_json::from_slice(&bytes).map_err(|e| conduit_core::error::ConduitError::internal(format!("decoding executor record: {e}")))
                })
                .collect()
        })
        .await
        .map_err(|e| conduit_core::error::ConduitError::internal(format!("blocking task join: {e}")))?
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn put_list_remove_round_trip() {
        let state = InMemoryClusterState::new();
        state
            .put_executor(ExecutorRecord {
                resource_id: ResourceId::new("exec-1"),
                address: "10.0.0.1:9000".into(),
                total_slots: 4,
            })
            .await
            .unwrap();

        assert_eq!(state.list_executors().await.unwrap().len(), 1);
        state.remove_executor(&ResourceId::new("exec-1")).await.unwrap();
        assert!(state.get_executor(&ResourceId::new("exec-1")).await.unwrap().is_none());
    }

    #[cfg(feature = "sled-cluster")]
    #[tokio::test]
    async fn sled_backed_state_survives_reopening_the_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let state = SledClusterState::open(dir.path()).unwrap();
        state
            .put_executor(ExecutorRecord {
                resource_id: ResourceId::new("exec-1"),
                address: "10.0.0.1:9000".into(),
                total_slots: 4,
            })
            .await
            .unwrap();
        drop(state);

        let reopened = SledClusterState::open(dir.path()).unwrap();
        let record = reopened.get_executor(&ResourceId::new("exec-1")).await.unwrap().unwrap();
        assert_eq!(record.total_slots, 4);
        assert_eq!(reopened.list_executors().await.unwrap().len(), 1);
    }
}
