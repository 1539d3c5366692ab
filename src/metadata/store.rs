//! Abstract metadata store trait.
//!
//! Any metadata backend must implement [`MetadataStore`].  The trait
//! uses manually desugared async methods (pinned boxed futures) so it
//! can be used as `Arc<dyn MetadataStore>`.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use utoipa::ToSchema;

// ── Record types ───────────────────────────────────────────────────

/// Metadata record for one uploaded file.
///
/// Serialized with camelCase field names; this is also the success body
/// of the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileRecord {
    /// Generated object key, `<uuid>_<original name>`.
    pub file_name: String,
    /// MIME type taken from the uploaded part.
    pub content_type: String,
    /// Container the object was written to.
    pub container_name: String,
    /// URI of the stored object.  Empty until the upload succeeds.
    pub file_path: String,
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
pub trait MetadataStore: Send + Sync + 'static {
    /// Append a file record and commit it.
    fn insert_file(
        &self,
        record: UploadedFileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Look up a file record by its generated file name.
    fn get_file(
        &self,
        file_name: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UploadedFileRecord>>> + Send + '_>>;

    /// Count all stored file records.
    fn count_files(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;
}
