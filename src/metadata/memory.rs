//! In-memory metadata store.
//!
//! Keeps file records in insertion order with no persistence. Useful for
//! testing and ephemeral deployments. Uses `RwLock<Vec>` for thread-safe
//! access.

use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use super::store::{MetadataStore, UploadedFileRecord};

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    files: RwLock<Vec<UploadedFileRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn insert_file(
        &self,
        record: UploadedFileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut files = self
                .files
                .write()
                .map_err(|_| anyhow::anyhow!("rwlock poisoned"))?;
            if files.iter().any(|f| f.file_name == record.file_name) {
                anyhow::bail!("file record already exists: {}", record.file_name);
            }
            files.push(record);
            Ok(())
        })
    }

    fn get_file(
        &self,
        file_name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UploadedFileRecord>>> + Send + '_>>
    {
        let file_name = file_name.to_string();
        Box::pin(async move {
            let files = self
                .files
                .read()
                .map_err(|_| anyhow::anyhow!("rwlock poisoned"))?;
            Ok(files.iter().find(|f| f.file_name == file_name).cloned())
        })
    }

    fn count_files(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let files = self
                .files
                .read()
                .map_err(|_| anyhow::anyhow!("rwlock poisoned"))?;
            Ok(files.len() as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> UploadedFileRecord {
        UploadedFileRecord {
            file_name: name.to_string(),
            content_type: "image/jpeg".to_string(),
            container_name: "files".to_string(),
            file_path: format!("http://localhost/blobs/files/{name}"),
        }
    }

    #[tokio::test]
    async fn test_insert_get_count() {
        let store = MemoryMetadataStore::new();
        store.insert_file(record("a.jpg")).await.unwrap();
        store.insert_file(record("b.jpg")).await.unwrap();

        assert_eq!(store.count_files().await.unwrap(), 2);
        assert_eq!(
            store.get_file("b.jpg").await.unwrap().unwrap().file_name,
            "b.jpg"
        );
        assert!(store.get_file("c.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = MemoryMetadataStore::new();
        store.insert_file(record("a.jpg")).await.unwrap();
        assert!(store.insert_file(record("a.jpg")).await.is_err());
        assert_eq!(store.count_files().await.unwrap(), 1);
    }
}
