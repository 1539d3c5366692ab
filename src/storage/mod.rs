//! Object storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where uploaded
//! bytes physically live.  Implementations include local disk, an
//! in-process map, and a gateway to Azure Blob Storage.

pub mod azure;
pub mod backend;
pub mod local;
pub mod memory;
