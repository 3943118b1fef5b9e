//! libSQL storage layer for the numsheet cache.
//!
//! The [`Storage`] struct wraps a local libSQL database holding one cache
//! record per `(source, key)` plus the history of generation runs.
//!
//! **Access rules:**
//! - `generate` / `refresh`: read-write (sole writer) via [`Storage::open`]
//! - `cache show` / `cache list`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use numsheet_shared::{CacheEntry, NumsheetError, Payload, ResourceId, ResourceKey, Result, Source};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Cache record metadata without the payload body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub resource: ResourceId,
    pub fingerprint: String,
    pub fetched_at: DateTime<Utc>,
    pub payload_len: usize,
}

/// One recorded generation run (a single hundred-range).
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub id: String,
    pub range_label: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats_json: Option<String>,
}

fn storage_err(e: impl std::fmt::Display) -> NumsheetError {
    NumsheetError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NumsheetError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NumsheetError::Storage(format!(
                "cache database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
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
                        NumsheetError::Storage(format!(
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

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(NumsheetError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cache entries
    // -----------------------------------------------------------------------

    /// Fetch the stored entry for a resource.
    pub async fn get_entry(&self, id: &ResourceId) -> Result<Option<CacheEntry>> {
        let key = id.key.to_string();
        let mut rows = self
            .conn
            .query(
                "SELECT payload_json, fingerprint, fetched_at
                 FROM cache_entries WHERE source = ?1 AND resource_key = ?2",
                params![id.source.as_str(), key.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let payload_json: String = row.get(0).map_err(storage_err)?;
                let fingerprint: String = row.get(1).map_err(storage_err)?;
                let fetched_at: String = row.get(2).map_err(storage_err)?;
                Ok(Some(CacheEntry {
                    resource: id.clone(),
                    payload: Payload::from_json(&payload_json)?,
                    fetched_at: parse_timestamp(&fetched_at)?,
                    fingerprint,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Insert or replace the entry for `entry.resource`.
    pub async fn put_entry(&self, entry: &CacheEntry) -> Result<()> {
        self.check_writable()?;
        let key = entry.resource.key.to_string();
        let payload_json = entry.payload.to_json()?;
        self.conn
            .execute(
                "INSERT INTO cache_entries (source, resource_key, payload_json, fingerprint, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(source, resource_key) DO UPDATE SET
                   payload_json = excluded.payload_json,
                   fingerprint = excluded.fingerprint,
                   fetched_at = excluded.fetched_at",
                params![
                    entry.resource.source.as_str(),
                    key.as_str(),
                    payload_json.as_str(),
                    entry.fingerprint.as_str(),
                    entry.fetched_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// List stored entries, optionally restricted to one source.
    /// Ordered by source, then numbers ascending, then external keys.
    pub async fn list_entries(&self, source: Option<Source>) -> Result<Vec<EntrySummary>> {
        let filter = source.map(|s| s.as_str()).unwrap_or("");
        let mut rows = self
            .conn
            .query(
                "SELECT source, resource_key, fingerprint, fetched_at, length(payload_json)
                 FROM cache_entries
                 WHERE ?1 = '' OR source = ?1",
                params![filter],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_summary(&row)?);
        }
        results.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(results)
    }

    /// Number of stored entries for a source.
    pub async fn count_entries(&self, source: Source) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM cache_entries WHERE source = ?1",
                params![source.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(storage_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Generation runs
    // -----------------------------------------------------------------------

    /// Record the start of a range run. Returns the generated run ID.
    pub async fn insert_generation_run(&self, range_label: &str, mode: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO generation_runs (id, range_label, mode, started_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), range_label, mode, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Mark a run finished with its statistics.
    pub async fn finish_generation_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE generation_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn recent_generation_runs(&self, limit: u32) -> Result<Vec<GenerationRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, range_label, mode, started_at, finished_at, stats_json
                 FROM generation_runs ORDER BY id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let started: String = row.get(3).map_err(storage_err)?;
            let finished: Option<String> = row.get(4).ok();
            results.push(GenerationRun {
                id: row.get(0).map_err(storage_err)?,
                range_label: row.get(1).map_err(storage_err)?,
                mode: row.get(2).map_err(storage_err)?,
                started_at: parse_timestamp(&started)?,
                finished_at: finished.as_deref().map(parse_timestamp).transpose()?,
                stats_json: row.get(5).ok(),
            });
        }
        Ok(results)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NumsheetError::Storage(format!("invalid date '{s}': {e}")))
}

/// Convert a `cache_entries` row to an [`EntrySummary`].
fn row_to_summary(row: &libsql::Row) -> Result<EntrySummary> {
    let source: String = row.get(0).map_err(storage_err)?;
    let key: String = row.get(1).map_err(storage_err)?;
    let fetched_at: String = row.get(3).map_err(storage_err)?;

    let source: Source = source.parse()?;
    let key: ResourceKey = key.parse()?;

    Ok(EntrySummary {
        resource: ResourceId { source, key },
        fingerprint: row.get(2).map_err(storage_err)?,
        fetched_at: parse_timestamp(&fetched_at)?,
        payload_len: row.get::<i64>(4).map(|v| v as usize).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use numsheet_shared::{CodeTable, EntityRef, NumberItem};
    use std::collections::BTreeMap;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ns_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn item_entry(n: u16, qid: &str) -> CacheEntry {
        let payload = Payload::NumberItem(NumberItem {
            qid: qid.into(),
            label: Some(n.to_string()),
            description: Some("natural number".into()),
        });
        CacheEntry {
            resource: ResourceId::number(Source::StructuredData, n),
            fingerprint: payload.fingerprint().unwrap(),
            payload,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ns_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn entry_put_get_and_overwrite() {
        let storage = test_storage().await;
        let id = ResourceId::number(Source::StructuredData, 42);

        assert!(storage.get_entry(&id).await.expect("miss").is_none());

        let entry = item_entry(42, "Q713");
        storage.put_entry(&entry).await.expect("put");
        let found = storage.get_entry(&id).await.expect("get").expect("present");
        assert_eq!(found.payload, entry.payload);
        assert_eq!(found.fingerprint, entry.fingerprint);

        let replaced = item_entry(42, "Q999");
        storage.put_entry(&replaced).await.expect("overwrite");
        let found = storage.get_entry(&id).await.unwrap().unwrap();
        assert_eq!(found.fingerprint, replaced.fingerprint);
        assert_eq!(storage.count_entries(Source::StructuredData).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn external_keys_and_listing() {
        let storage = test_storage().await;
        let mut codes = BTreeMap::new();
        codes.insert(
            81,
            vec![EntityRef {
                label: "Japan".into(),
                qid: "Q17".into(),
            }],
        );
        let payload = Payload::CodeTable(CodeTable { codes });
        let table = CacheEntry {
            resource: ResourceId::external(Source::StructuredData, "calling-codes"),
            fingerprint: payload.fingerprint().unwrap(),
            payload,
            fetched_at: Utc::now(),
        };
        storage.put_entry(&table).await.unwrap();
        storage.put_entry(&item_entry(100, "Q37")).await.unwrap();
        storage.put_entry(&item_entry(7, "Q23350")).await.unwrap();

        let article = CacheEntry {
            resource: ResourceId::number(Source::ProseArticle, 7),
            fingerprint: Payload::Missing.fingerprint().unwrap(),
            payload: Payload::Missing,
            fetched_at: Utc::now(),
        };
        storage.put_entry(&article).await.unwrap();

        let all = storage.list_entries(None).await.expect("list");
        assert_eq!(all.len(), 4);

        let wikidata = storage
            .list_entries(Some(Source::StructuredData))
            .await
            .expect("list wikidata");
        let keys: Vec<String> = wikidata.iter().map(|e| e.resource.key.to_string()).collect();
        assert_eq!(keys, vec!["7", "100", "calling-codes"]);
        assert!(wikidata.iter().all(|e| e.payload_len > 0));
    }

    #[tokio::test]
    async fn generation_run_lifecycle() {
        let storage = test_storage().await;
        let run_id = storage
            .insert_generation_run("0-99", "offline")
            .await
            .expect("insert run");
        assert!(!run_id.is_empty());

        storage
            .finish_generation_run(&run_id, r#"{"written": 100}"#)
            .await
            .expect("finish run");

        let runs = storage.recent_generation_runs(5).await.expect("runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].range_label, "0-99");
        assert!(runs[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ns_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.put_entry(&item_entry(1, "Q199")).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.get_entry(&ResourceId::number(Source::StructuredData, 1)).await.unwrap().is_some());
        let result = ro.put_entry(&item_entry(2, "Q200")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("ns_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
