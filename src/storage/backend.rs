//! Abstract storage backend trait.
//!
//! Every storage backend must implement [`StorageBackend`].  Objects are
//! addressed by a container name and a key inside that container; a
//! successful write returns the object's canonical URI.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// A stored object's data plus the content type it was written with.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Raw bytes of the object.
    pub data: Bytes,
    /// MIME type attached at write time.
    pub content_type: String,
}

/// Async object storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Create `container` if it does not exist yet.  Idempotent.
    fn ensure_container(
        &self,
        container: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Write `data` under `key` in `container`, overwriting any existing
    /// object, and return the object's URI.
    fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;

    /// Read the full object at `key` in `container`.
    fn get(
        &self,
        container: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<StoredObject>> + Send + '_>>;

    /// Check whether an object exists at `key` in `container`.
    fn exists(
        &self,
        container: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;
}
