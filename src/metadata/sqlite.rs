//! SQLite-backed metadata store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::store::{MetadataStore, UploadedFileRecord};

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

/// Metadata store backed by a single SQLite database file.
pub struct SqliteMetadataStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("metadata connection mutex poisoned"))
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables and indexes if they do not already exist.
    /// This is idempotent -- safe to call on every startup.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name       TEXT NOT NULL,
                content_type    TEXT NOT NULL,
                container_name  TEXT NOT NULL,
                file_path       TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_files_file_name
                ON files(file_name);
            CREATE INDEX IF NOT EXISTS idx_files_container
                ON files(container_name);
            ",
        )?;

        let existing: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        if existing.map_or(true, |v| v < SCHEMA_VERSION) {
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, now_iso8601()],
            )?;
        }

        Ok(())
    }
}

/// Current time as ISO-8601 with milliseconds, e.g. `2026-10-19T12:00:00.000Z`.
fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── MetadataStore implementation ───────────────────────────────────

impl MetadataStore for SqliteMetadataStore {
    fn insert_file(
        &self,
        record: UploadedFileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO files (file_name, content_type, container_name, file_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.file_name,
                    record.content_type,
                    record.container_name,
                    record.file_path,
                    now_iso8601(),
                ],
            )?;
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
            let conn = self.lock()?;
            let record = conn
                .query_row(
                    "SELECT file_name, content_type, container_name, file_path
                     FROM files WHERE file_name = ?1",
                    params![file_name],
                    |row| {
                        Ok(UploadedFileRecord {
                            file_name: row.get(0)?,
                            content_type: row.get(1)?,
                            container_name: row.get(2)?,
                            file_path: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
    }

    fn count_files(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteMetadataStore {
        SqliteMetadataStore::new(":memory:").expect("failed to create in-memory store")
    }

    fn make_record(file_name: &str, container: &str) -> UploadedFileRecord {
        UploadedFileRecord {
            file_name: file_name.to_string(),
            content_type: "image/png".to_string(),
            container_name: container.to_string(),
            file_path: format!("https://blobs.test/{container}/{file_name}"),
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let store = test_store();
        store.init_db().unwrap();
        store.init_db().unwrap();

        let conn = store.lock().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = test_store();
        let record = make_record("abc_photo.png", "files");
        store.insert_file(record.clone()).await.unwrap();

        let fetched = store.get_file("abc_photo.png").await.unwrap();
        assert_eq!(fetched, Some(record));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = test_store();
        assert!(store.get_file("nope.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_files() {
        let store = test_store();
        assert_eq!(store.count_files().await.unwrap(), 0);
        store
            .insert_file(make_record("a_1.png", "files"))
            .await
            .unwrap();
        store
            .insert_file(make_record("b_2.png", "avatars"))
            .await
            .unwrap();
        assert_eq!(store.count_files().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_file_name_rejected() {
        let store = test_store();
        store
            .insert_file(make_record("same.png", "files"))
            .await
            .unwrap();
        assert!(store
            .insert_file(make_record("same.png", "files"))
            .await
            .is_err());
        assert_eq!(store.count_files().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteMetadataStore::new(path).unwrap();
            store
                .insert_file(make_record("kept.png", "files"))
                .await
                .unwrap();
        }

        let store = SqliteMetadataStore::new(path).unwrap();
        let fetched = store.get_file("kept.png").await.unwrap().unwrap();
        assert_eq!(fetched.container_name, "files");
    }
}
