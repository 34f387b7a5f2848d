//! Git metadata persisted as one JSON file per project session

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use workbench_core::ports::MetadataStore;
use workbench_core::Result;
use workbench_types::GitMetadata;

const INDEX_FILE: &str = "sessions.json";

pub struct FileMetadataStore {
    dir: PathBuf,
}

impl FileMetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Session id of a project directory, generated on first use
    pub async fn session_for(&self, project: &Path) -> Result<String> {
        let index_path = self.dir.join(INDEX_FILE);
        let mut index: BTreeMap<String, String> =
            match tokio::fs::read_to_string(&index_path).await {
                Ok(content) => serde_json::from_str(&content)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
                Err(e) => return Err(e.into()),
            };

        let key = project.to_string_lossy().to_string();
        if let Some(id) = index.get(&key) {
            return Ok(id.clone());
        }

        let id = uuid::Uuid::new_v4().to_string();
        index.insert(key, id.clone());
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&index_path, serde_json::to_string_pretty(&index)?).await?;
        Ok(id)
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn get(&self, session_id: &str) -> Result<Option<GitMetadata>> {
        match tokio::fs::read_to_string(self.path(session_id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, session_id: &str, metadata: &GitMetadata) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(metadata)?;
        tokio::fs::write(self.path(session_id), content).await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(session_id)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_ids_are_stable_per_project() {
        let dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(dir.path().join("git"));

        let first = store.session_for(Path::new("/home/me/app")).await.unwrap();
        let again = store.session_for(Path::new("/home/me/app")).await.unwrap();
        let other = store.session_for(Path::new("/home/me/site")).await.unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);

        let reopened = FileMetadataStore::new(dir.path().join("git"));
        assert_eq!(
            reopened.session_for(Path::new("/home/me/app")).await.unwrap(),
            first
        );
    }

    #[tokio::test]
    async fn test_round_trip_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileMetadataStore::new(dir.path().join("git"));
        let id = store.session_for(Path::new("/home/me/app")).await.unwrap();

        assert!(store.get(&id).await.unwrap().is_none());

        let mut metadata = GitMetadata::new("octo/app", "main");
        metadata.commit_history = vec!["A".to_string(), "B".to_string()];
        store.put(&id, &metadata).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), Some(metadata));

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
