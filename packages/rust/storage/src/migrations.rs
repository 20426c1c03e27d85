//! SQL migration definitions for the centipede cache database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: cache_records keyed by (namespace, key)",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Memoized compute results; one record per key within a namespace
CREATE TABLE IF NOT EXISTS cache_records (
    namespace  TEXT NOT NULL,
    key        TEXT NOT NULL CHECK (length(key) <= 1000),
    value      TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
