//! SQL migration definitions for the numsheet cache database.
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
    vec![
        Migration {
            version: 1,
            description: "Initial schema: cache_entries",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per (source, key); payload is opaque JSON
CREATE TABLE IF NOT EXISTS cache_entries (
    source       TEXT NOT NULL,
    resource_key TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    fingerprint  TEXT NOT NULL,
    fetched_at   TEXT NOT NULL,
    PRIMARY KEY (source, resource_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_fetched ON cache_entries(fetched_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Generation run history",
            sql: r#"
CREATE TABLE IF NOT EXISTS generation_runs (
    id          TEXT PRIMARY KEY,
    range_label TEXT NOT NULL,
    mode        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_generation_runs_started ON generation_runs(started_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
