//! Metadata storage layer.
//!
//! The metadata store keeps one append-only record per uploaded file.
//! The [`store::MetadataStore`] trait defines the interface;
//! [`sqlite::SqliteMetadataStore`] is the default implementation and
//! [`memory::MemoryMetadataStore`] backs ephemeral setups and tests.

pub mod memory;
pub mod sqlite;
pub mod store;
