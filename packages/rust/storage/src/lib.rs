//! Turso Embedded / libSQL storage layer for the content cache.
//!
//! The [`Storage`] struct wraps a libSQL database holding cache records:
//! opaque serialized values addressed by `(namespace, key)`. Records are
//! only ever inserted or overwritten, never deleted.

mod migrations;

use std::path::Path;

use centipede_shared::{CentipedeError, Result};
use chrono::Utc;
use libsql::{Connection, Database, params};

/// Longest key the cache accepts.
pub const MAX_KEY_LEN: usize = 1000;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CentipedeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CentipedeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CentipedeError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CentipedeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Cache record operations
    // -----------------------------------------------------------------------

    /// Point lookup of a cached value.
    pub async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM cache_records WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .await
            .map_err(|e| CentipedeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| CentipedeError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(CentipedeError::Storage(e.to_string())),
        }
    }

    /// Store a value (upserts; the last write for a key wins).
    pub async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        if key.chars().count() > MAX_KEY_LEN {
            return Err(CentipedeError::validation(format!(
                "cache key longer than {MAX_KEY_LEN} characters"
            )));
        }

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO cache_records (namespace, key, value, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE SET
                   value = excluded.value,
                   created_at = excluded.created_at",
                params![namespace, key, value, now.as_str()],
            )
            .await
            .map_err(|e| CentipedeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Number of records stored under a namespace.
    pub async fn count(&self, namespace: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM cache_records WHERE namespace = ?1",
                params![namespace],
            )
            .await
            .map_err(|e| CentipedeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| CentipedeError::Storage(e.to_string()))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(CentipedeError::Storage(e.to_string())),
        }
    }
}
