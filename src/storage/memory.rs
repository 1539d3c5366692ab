//! In-memory storage backend.
//!
//! Containers and their objects are held in a
//! `tokio::sync::RwLock<HashMap<...>>`.  Nothing survives a restart; the
//! backend exists for development setups and tests.

use bytes::Bytes;
use reqwest::Url;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::backend::{StorageBackend, StoredObject};

/// Objects of one container: key -> (data, content type).
type Container = HashMap<String, (Bytes, String)>;

/// In-memory storage backend.
pub struct MemoryBackend {
    /// container name -> objects.
    containers: tokio::sync::RwLock<HashMap<String, Container>>,
    /// Base that object URIs are built on.
    base_url: Url,
}

impl MemoryBackend {
    /// Create an empty backend whose object URIs start with `base_url`.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid memory base_url {:?}: {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("memory base_url cannot be a base: {}", base_url);
        }
        Ok(Self {
            containers: tokio::sync::RwLock::new(HashMap::new()),
            base_url,
        })
    }

    /// Build `{base_url}/{container}/{key}` with each segment percent-encoded.
    fn object_url(&self, container: &str, key: &str) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("memory base_url cannot be a base"))?
            .pop_if_empty()
            .push(container)
            .push(key);
        Ok(url)
    }

    /// Number of objects across all containers.
    pub async fn object_count(&self) -> usize {
        self.containers
            .read()
            .await
            .values()
            .map(|objects| objects.len())
            .sum()
    }
}

impl StorageBackend for MemoryBackend {
    fn ensure_container(
        &self,
        container: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let container = container.to_string();
        Box::pin(async move {
            if container.is_empty() {
                anyhow::bail!("Invalid container name: empty");
            }
            self.containers
                .write()
                .await
                .entry(container)
                .or_default();
            Ok(())
        })
    }

    fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let container = container.to_string();
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let url = self.object_url(&container, &key)?;
            let mut containers = self.containers.write().await;
            let objects = containers
                .get_mut(&container)
                .ok_or_else(|| anyhow::anyhow!("Container does not exist: {}", container))?;
            objects.insert(key, (data, content_type));
            Ok(url.to_string())
        })
    }

    fn get(
        &self,
        container: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<StoredObject>> + Send + '_>> {
        let container = container.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let containers = self.containers.read().await;
            let (data, content_type) = containers
                .get(&container)
                .and_then(|objects| objects.get(&key))
                .ok_or_else(|| anyhow::anyhow!("Object not found: {}/{}", container, key))?;
            Ok(StoredObject {
                data: data.clone(),
                content_type: content_type.clone(),
            })
        })
    }

    fn exists(
        &self,
        container: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let container = container.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let containers = self.containers.read().await;
            Ok(containers
                .get(&container)
                .is_some_and(|objects| objects.contains_key(&key)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> MemoryBackend {
        MemoryBackend::new("https://blobs.example.test/store").unwrap()
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(MemoryBackend::new("not a url").is_err());
        assert!(MemoryBackend::new("mailto:someone@example.com").is_err());
    }

    #[tokio::test]
    async fn test_put_returns_object_url() {
        let backend = test_backend();
        backend.ensure_container("files").await.unwrap();

        let uri = backend
            .put("files", "abc_photo.png", Bytes::from("x"), "image/png")
            .await
            .unwrap();
        assert_eq!(uri, "https://blobs.example.test/store/files/abc_photo.png");
    }

    #[tokio::test]
    async fn test_url_encodes_unusual_names() {
        let backend = test_backend();
        backend.ensure_container("files").await.unwrap();

        let uri = backend
            .put("files", "id_my photo/x.png", Bytes::from("x"), "image/png")
            .await
            .unwrap();
        assert!(Url::parse(&uri).is_ok());
        assert!(uri.ends_with("/files/id_my%20photo%2Fx.png"));
    }

    #[tokio::test]
    async fn test_put_requires_container() {
        let backend = test_backend();
        let result = backend
            .put("files", "a.png", Bytes::from("x"), "image/png")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ensure_container_keeps_objects() {
        let backend = test_backend();
        backend.ensure_container("files").await.unwrap();
        backend
            .put("files", "a.png", Bytes::from("x"), "image/png")
            .await
            .unwrap();
        backend.ensure_container("files").await.unwrap();
        assert!(backend.exists("files", "a.png").await.unwrap());
        assert_eq!(backend.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_returns_content_type() {
        let backend = test_backend();
        backend.ensure_container("avatars").await.unwrap();
        backend
            .put("avatars", "a.svg", Bytes::from("<svg/>"), "image/svg+xml")
            .await
            .unwrap();

        let obj = backend.get("avatars", "a.svg").await.unwrap();
        assert_eq!(obj.data, Bytes::from("<svg/>"));
        assert_eq!(obj.content_type, "image/svg+xml");
        assert!(backend.get("avatars", "b.svg").await.is_err());
        assert!(!backend.exists("files", "a.svg").await.unwrap());
    }
}
