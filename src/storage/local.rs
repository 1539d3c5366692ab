//! Local filesystem storage backend.
//!
//! Each container is a directory under a configurable root and each
//! object a file inside it.  The content type of every object is kept
//! in a sidecar file under `{root}/.meta/{container}/{key}`.
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use bytes::Bytes;
use reqwest::Url;
use std::future::Future;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use super::backend::{StorageBackend, StoredObject};

/// Directory holding content-type sidecars.
const META_DIR: &str = ".meta";

/// Directory holding in-flight temp files.
const TMP_DIR: &str = ".tmp";

/// Stores objects on the local filesystem.
pub struct LocalBackend {
    /// Absolute root directory for all containers.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(TMP_DIR))?;
        std::fs::create_dir_all(root.join(META_DIR))?;
        // Object URIs are file:// URLs, which need an absolute path.
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    /// Check a container name maps to exactly one directory under the root.
    fn validate_container(container: &str) -> anyhow::Result<()> {
        if container.is_empty()
            || container.starts_with('.')
            || container.contains('/')
            || container.contains('\\')
        {
            anyhow::bail!("Invalid container name: {:?}", container);
        }
        Ok(())
    }

    /// Resolve a container/key pair to a path under `base`.
    ///
    /// Rejects keys containing `..` components so a path never escapes
    /// the container directory.
    fn resolve_under(&self, base: &Path, container: &str, key: &str) -> anyhow::Result<PathBuf> {
        Self::validate_container(container)?;
        if key.is_empty() {
            anyhow::bail!("Empty object key");
        }
        for component in Path::new(key).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => anyhow::bail!("Path traversal detected in object key: {}", key),
            }
        }
        Ok(base.join(container).join(key))
    }

    fn object_path(&self, container: &str, key: &str) -> anyhow::Result<PathBuf> {
        self.resolve_under(&self.root, container, key)
    }

    fn content_type_path(&self, container: &str, key: &str) -> anyhow::Result<PathBuf> {
        self.resolve_under(&self.root.join(META_DIR), container, key)
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(TMP_DIR).join(format!("tmp-{}", id))
    }

    /// Crash-only write: temp file, fsync, rename over `final_path`.
    fn write_atomic(&self, final_path: &Path, data: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.temp_path();
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;

        std::fs::rename(&tmp_path, final_path)?;
        Ok(())
    }
}

impl StorageBackend for LocalBackend {
    fn ensure_container(
        &self,
        container: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let container = container.to_string();
        Box::pin(async move {
            Self::validate_container(&container)?;
            std::fs::create_dir_all(self.root.join(&container))?;
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
            let container_dir = self.root.join(&container);
            if !container_dir.is_dir() {
                anyhow::bail!("Container does not exist: {}", container);
            }

            let final_path = self.object_path(&container, &key)?;
            let meta_path = self.content_type_path(&container, &key)?;

            self.write_atomic(&final_path, &data)?;
            self.write_atomic(&meta_path, content_type.as_bytes())?;

            let url = Url::from_file_path(&final_path).map_err(|_| {
                anyhow::anyhow!("Cannot build file URL for {}", final_path.display())
            })?;
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
            let path = self.object_path(&container, &key)?;
            if !path.is_file() {
                anyhow::bail!("Object not found: {}/{}", container, key);
            }

            let data = Bytes::from(std::fs::read(&path)?);
            let meta_path = self.content_type_path(&container, &key)?;
            let content_type = std::fs::read_to_string(&meta_path)
                .unwrap_or_else(|_| "application/octet-stream".to_string());

            Ok(StoredObject { data, content_type })
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
            let path = self.object_path(&container, &key)?;
            Ok(path.is_file())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let backend = LocalBackend::new(dir.path()).expect("failed to create backend");
        (dir, backend)
    }

    #[tokio::test]
    async fn test_ensure_container_is_idempotent() {
        let (dir, backend) = test_backend();
        backend.ensure_container("files").await.unwrap();
        backend.ensure_container("files").await.unwrap();
        assert!(dir.path().join("files").is_dir());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_dir, backend) = test_backend();
        backend.ensure_container("files").await.unwrap();

        let data = Bytes::from("png bytes");
        let uri = backend
            .put("files", "abc_photo.png", data.clone(), "image/png")
            .await
            .unwrap();

        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with("/files/abc_photo.png"));

        let obj = backend.get("files", "abc_photo.png").await.unwrap();
        assert_eq!(obj.data, data);
        assert_eq!(obj.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_put_without_container_fails() {
        let (_dir, backend) = test_backend();
        let result = backend
            .put("avatars", "a.png", Bytes::from("x"), "image/png")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let (_dir, backend) = test_backend();
        backend.ensure_container("files").await.unwrap();

        backend
            .put("files", "k.png", Bytes::from("version 1"), "image/png")
            .await
            .unwrap();
        backend
            .put("files", "k.png", Bytes::from("version 2"), "image/jpeg")
            .await
            .unwrap();

        let obj = backend.get("files", "k.png").await.unwrap();
        assert_eq!(obj.data, Bytes::from("version 2"));
        assert_eq!(obj.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_key_with_separator_creates_parent_dirs() {
        let (_dir, backend) = test_backend();
        backend.ensure_container("files").await.unwrap();

        backend
            .put("files", "id_nested/dir/pic.jpg", Bytes::from("x"), "image/jpeg")
            .await
            .unwrap();
        assert!(backend.exists("files", "id_nested/dir/pic.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let (_dir, backend) = test_backend();
        backend.ensure_container("files").await.unwrap();

        assert!(!backend.exists("files", "a.png").await.unwrap());
        backend
            .put("files", "a.png", Bytes::from("data"), "image/png")
            .await
            .unwrap();
        assert!(backend.exists("files", "a.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_error() {
        let (_dir, backend) = test_backend();
        backend.ensure_container("files").await.unwrap();
        assert!(backend.get("files", "missing.png").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let (_dir, backend) = test_backend();
        assert!(backend.ensure_container("../outside").await.is_err());
        assert!(backend.ensure_container(".meta").await.is_err());

        backend.ensure_container("files").await.unwrap();
        let result = backend
            .put("files", "../../escape.png", Bytes::from("x"), "image/png")
            .await;
        assert!(result.is_err());
    }
}
