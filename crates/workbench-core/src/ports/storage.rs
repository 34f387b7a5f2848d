//! Persistence of per-session git metadata

use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use workbench_types::GitMetadata;

/// Opaque CRUD over git metadata keyed by chat/session id
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<GitMetadata>>;
    async fn put(&self, session_id: &str, metadata: &GitMetadata) -> Result<()>;
    async fn delete(&self, session_id: &str) -> Result<()>;
}

/// In-memory store
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    data: Arc<DashMap<String, GitMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, session_id: &str) -> Result<Option<GitMetadata>> {
        Ok(self.data.get(session_id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, session_id: &str, metadata: &GitMetadata) -> Result<()> {
        self.data.insert(session_id.to_string(), metadata.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.data.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryMetadataStore::new();
        assert!(store.get("chat-1").await.unwrap().is_none());

        let metadata = GitMetadata::new("octo/app", "main");
        store.put("chat-1", &metadata).await.unwrap();
        assert_eq!(store.get("chat-1").await.unwrap(), Some(metadata));

        store.delete("chat-1").await.unwrap();
        assert!(store.is_empty());
    }
}
