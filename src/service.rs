//! Storage orchestration for validated uploads.
//!
//! [`FileService::store`] runs the fixed sequence
//! ensure-container -> generate key -> upload -> persist record.
//! Nothing is retried and the two writes are not atomic: if the record
//! cannot be persisted the uploaded object stays in the store.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::metadata::store::{MetadataStore, UploadedFileRecord};
use crate::storage::backend::StorageBackend;

/// A file that passed validation and is ready to be stored.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    /// File name as sent by the client.
    pub original_name: String,
    /// MIME type of the uploaded part.
    pub content_type: String,
    /// Target container.
    pub container: String,
    /// File contents.
    pub data: Bytes,
}

/// Writes uploads to the object store and records them in the metadata store.
#[derive(Clone)]
pub struct FileService {
    storage: Arc<dyn StorageBackend>,
    metadata: Arc<dyn MetadataStore>,
}

impl FileService {
    pub fn new(storage: Arc<dyn StorageBackend>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { storage, metadata }
    }

    /// Create `container` if it does not exist yet.
    pub async fn ensure_container(&self, container: &str) -> anyhow::Result<()> {
        self.storage.ensure_container(container).await
    }

    /// Build a unique object key, `<uuid>_<original>`.
    ///
    /// The original name is kept verbatim, separators included.
    pub fn generate_object_key(original_name: &str) -> String {
        format!("{}_{}", uuid::Uuid::new_v4(), original_name)
    }

    /// Write `data` under `key` with its content type and return the object URI.
    pub async fn upload_object(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> anyhow::Result<String> {
        self.storage.put(container, key, data, content_type).await
    }

    /// Append `record` to the metadata store.
    pub async fn persist_record(&self, record: UploadedFileRecord) -> anyhow::Result<()> {
        self.metadata.insert_file(record).await
    }

    /// Store a validated upload and return the persisted record.
    pub async fn store(&self, upload: ValidatedUpload) -> anyhow::Result<UploadedFileRecord> {
        let mut record = UploadedFileRecord {
            file_name: Self::generate_object_key(&upload.original_name),
            content_type: upload.content_type,
            container_name: upload.container,
            file_path: String::new(),
        };

        self.ensure_container(&record.container_name).await?;

        let size = upload.data.len();
        record.file_path = self
            .upload_object(
                &record.container_name,
                &record.file_name,
                upload.data,
                &record.content_type,
            )
            .await?;
        debug!(
            "Uploaded {} bytes to {}/{}",
            size, record.container_name, record.file_name
        );

        self.persist_record(record.clone()).await?;
        info!(
            container = %record.container_name,
            file_name = %record.file_name,
            "Stored upload"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::storage::memory::MemoryBackend;
    use std::collections::HashSet;

    fn test_service() -> (Arc<MemoryBackend>, Arc<MemoryMetadataStore>, FileService) {
        let storage = Arc::new(MemoryBackend::new("https://blobs.test").unwrap());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let service = FileService::new(storage.clone(), metadata.clone());
        (storage, metadata, service)
    }

    fn upload(name: &str, container: &str) -> ValidatedUpload {
        ValidatedUpload {
            original_name: name.to_string(),
            content_type: "image/png".to_string(),
            container: container.to_string(),
            data: Bytes::from(vec![7u8; 1000]),
        }
    }

    #[test]
    fn test_object_key_format() {
        let key = FileService::generate_object_key("photo.png");
        let (id, rest) = key.split_once('_').unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert_eq!(rest, "photo.png");
    }

    #[test]
    fn test_object_key_keeps_name_verbatim() {
        let key = FileService::generate_object_key("dir/../we ird.png");
        assert!(key.ends_with("_dir/../we ird.png"));
    }

    #[test]
    fn test_object_keys_are_unique() {
        let keys: HashSet<String> = (0..1000)
            .map(|_| FileService::generate_object_key("same.png"))
            .collect();
        assert_eq!(keys.len(), 1000);
    }

    #[tokio::test]
    async fn test_store_writes_object_then_record() {
        let (storage, metadata, service) = test_service();

        let record = service.store(upload("photo.png", "files")).await.unwrap();

        assert!(record.file_name.ends_with("_photo.png"));
        assert_eq!(record.container_name, "files");
        assert_eq!(record.content_type, "image/png");
        assert_eq!(
            record.file_path,
            format!("https://blobs.test/files/{}", record.file_name)
        );

        let obj = storage.get("files", &record.file_name).await.unwrap();
        assert_eq!(obj.data.len(), 1000);
        assert_eq!(obj.content_type, "image/png");

        let stored = metadata.get_file(&record.file_name).await.unwrap();
        assert_eq!(stored, Some(record));
    }

    #[tokio::test]
    async fn test_store_creates_missing_container() {
        let (storage, _metadata, service) = test_service();
        let record = service.store(upload("me.jpg", "avatars")).await.unwrap();
        assert!(storage.exists("avatars", &record.file_name).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_same_name_uploads_do_not_collide() {
        let (storage, metadata, service) = test_service();

        let (a, b) = tokio::join!(
            service.store(upload("photo.png", "files")),
            service.store(upload("photo.png", "files"))
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.file_name, b.file_name);
        assert_eq!(storage.object_count().await, 2);
        assert_eq!(metadata.count_files().await.unwrap(), 2);
    }
}
