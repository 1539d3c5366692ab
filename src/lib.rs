//! FileProvider library -- image upload service.
//!
//! This crate provides the components of a single upload endpoint:
//! request validation, storage orchestration, pluggable object storage
//! backends, and a metadata store recording every stored file.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod service;
pub mod storage;

use crate::config::Config;
use crate::metadata::store::MetadataStore;
use crate::service::FileService;
use crate::storage::backend::StorageBackend;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Storage orchestrator over the shared storage and metadata clients.
    pub files: FileService,
}

impl AppState {
    pub fn new(
        config: Config,
        storage: Arc<dyn StorageBackend>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            config,
            files: FileService::new(storage, metadata),
        }
    }
}
