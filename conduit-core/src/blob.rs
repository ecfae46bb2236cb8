//! Blob store trait for large task payloads: external state handles,
//! deployment descriptors, and other data too large to inline into RPC
//! messages. Concrete storage is handled by external collaborators;
//! `conduit-core` only defines the seam.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

/// Opaque handle returned by `put`, stored inside a `JobGraph` deployment
/// descriptor or a checkpoint's external task-state-handle.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlobKey(pub String);

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, content_type: &str, data: Bytes) -> Result<BlobKey>;
    async fn get(&self, key: &BlobKey) -> Result<Bytes>;
    async fn delete(&self, key: &BlobKey) -> Result<()>;
}

/// In-memory blob store for tests, keyed by a random uuid.
#[derive(Default)]
pub struct InMemoryBlobStore {
    data: DashMap<String, (String, Bytes)>,
}

impl InMemoryBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, content_type: &str, data: Bytes) -> Result<BlobKey> {
        let key = uuid::Uuid::new_v4().to_string();
        self.data.insert(key.clone(), (content_type.to_owned(), data));
        Ok(BlobKey(key))
    }

    async fn get(&self, key: &BlobKey) -> Result<Bytes> {
        self.data
            .get(&key.0)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| crate::error::ConduitError::internal(format!("no such blob: {}", key.0)))
    }

    async fn delete(&self, key: &BlobKey) -> Result<()> {
        self.data.remove(&key.0);
        Ok(())
    }
}
