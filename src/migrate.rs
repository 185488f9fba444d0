// ABOUTME: Schema migrator: copies each source database into the target
// ABOUTME: Clean-slate per db_id, bulk insert with row-by-row fallback

use crate::config::TargetConfig;
use crate::engine;
use crate::error::EvalError;
use crate::source::{source_path, SourceDatabase, TableSchema};
use crate::value::SqlValue;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Rows per INSERT statement during bulk load.
const INSERT_CHUNK_ROWS: usize = 500;

#[derive(Debug)]
pub struct MigrationOutcome {
    pub db_id: String,
    pub tables: usize,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
}

/// What phase 1 produced: which databases are ready, and why the others
/// are not. Failures are propagated to their queries, never retried.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub completed: Vec<MigrationOutcome>,
    pub failed: HashMap<String, String>,
}

/// Migrate every distinct source database concurrently, bounded by
/// `workers`. A failure for one db_id never affects the others; each
/// migration task exclusively owns its db_id and its own connection.
pub async fn migrate_all(
    db_ids: Vec<String>,
    db_dir: PathBuf,
    cfg: TargetConfig,
    workers: usize,
) -> Result<MigrationReport> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let progress = ProgressBar::new(db_ids.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("Migrating databases [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("##-"),
    );

    let mut handles = Vec::with_capacity(db_ids.len());
    for db_id in db_ids {
        let permit = semaphore.clone().acquire_owned().await?;
        let db_dir = db_dir.clone();
        let cfg = cfg.clone();
        let progress = progress.clone();
        let task_db_id = db_id.clone();
        let handle = tokio::spawn(async move {
            let result = migrate_one(&task_db_id, &db_dir, &cfg).await;
            progress.inc(1);
            drop(permit);
            result
        });
        handles.push((db_id, handle));
    }

    let mut report = MigrationReport::default();
    for (db_id, handle) in handles {
        match handle.await {
            Ok(Ok(outcome)) => {
                tracing::info!(
                    "{}: migrated {} tables, {} rows ({} skipped)",
                    outcome.db_id,
                    outcome.tables,
                    outcome.rows_inserted,
                    outcome.rows_skipped
                );
                report.completed.push(outcome);
            }
            Ok(Err(e)) => {
                tracing::warn!("{}: migration failed: {}", db_id, e);
                report.failed.insert(db_id, e.to_string());
            }
            Err(e) => {
                report
                    .failed
                    .insert(db_id, format!("migration task panicked: {e}"));
            }
        }
    }
    progress.finish_and_clear();

    if !report.failed.is_empty() {
        tracing::warn!(
            "{} database(s) failed to migrate; their queries will be \
             reported as errors without execution",
            report.failed.len()
        );
    }
    Ok(report)
}

/// Migrate one source database into its target namespace.
pub async fn migrate_one(
    db_id: &str,
    db_dir: &Path,
    cfg: &TargetConfig,
) -> Result<MigrationOutcome, EvalError> {
    migrate_inner(db_id, db_dir, cfg)
        .await
        .map_err(|e| match e {
            already @ EvalError::Migration { .. } => already,
            other => EvalError::migration(db_id, other.to_string()),
        })
}

async fn migrate_inner(
    db_id: &str,
    db_dir: &Path,
    cfg: &TargetConfig,
) -> Result<MigrationOutcome, EvalError> {
    let path = source_path(db_dir, db_id);
    let snapshot = {
        tokio::task::spawn_blocking(move || -> Result<_, EvalError> {
            let source = SourceDatabase::open(&path)?;
            source.snapshot()
        })
        .await
        .map_err(|e| EvalError::Execution(format!("source read task failed: {e}")))??
    };

    let mut client = engine::connect(cfg).await?;
    let ns = cfg.engine.namespace_for(db_id);
    client.recreate_namespace(&ns).await?;

    let mut rows_inserted: u64 = 0;
    let mut rows_skipped: u64 = 0;
    for (schema, rows) in &snapshot {
        client.create_table(&ns, schema).await?;
        let (inserted, skipped) = load_table(client.as_mut(), &ns, schema, rows, db_id).await?;
        rows_inserted += inserted;
        rows_skipped += skipped;
    }

    if rows_skipped > 0 {
        tracing::warn!("{}: skipped {} unloadable row(s)", db_id, rows_skipped);
    }
    Ok(MigrationOutcome {
        db_id: db_id.to_string(),
        tables: snapshot.len(),
        rows_inserted,
        rows_skipped,
    })
}

/// Bulk-load one table. Each chunk is tried as a single INSERT first; on
/// failure it falls back to row-by-row, silently skipping rows that
/// individually refuse to insert. Bad data never aborts a migration.
async fn load_table(
    client: &mut dyn engine::TargetClient,
    ns: &engine::Namespace,
    schema: &TableSchema,
    rows: &[Vec<SqlValue>],
    db_id: &str,
) -> Result<(u64, u64), EvalError> {
    let mut inserted: u64 = 0;
    let mut skipped: u64 = 0;
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        match client.insert_rows(ns, schema, chunk).await {
            Ok(()) => inserted += chunk.len() as u64,
            Err(e) => {
                tracing::warn!(
                    "{}.{}: bulk insert failed ({}); retrying row by row",
                    db_id,
                    schema.name,
                    e
                );
                for row in chunk {
                    match client.insert_rows(ns, schema, std::slice::from_ref(row)).await {
                        Ok(()) => inserted += 1,
                        Err(_) => skipped += 1,
                    }
                }
            }
        }
    }
    Ok((inserted, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::QueryPayload;
    use crate::engine::{Engine, Namespace};
    use crate::source::ColumnDef;
    use async_trait::async_trait;
    use rusqlite::Connection;

    fn make_source(db_dir: &Path, db_id: &str, ddl: &str) {
        let dir = db_dir.join(db_id);
        std::fs::create_dir_all(&dir).unwrap();
        let conn = Connection::open(dir.join(format!("{db_id}.sqlite"))).unwrap();
        conn.execute_batch(ddl).unwrap();
    }

    fn sqlite_cfg(dir: &Path) -> TargetConfig {
        TargetConfig {
            engine: Engine::Sqlite,
            url: dir.join("target.db").to_string_lossy().into_owned(),
            timeout_secs: 10,
            connect_retries: 0,
        }
    }

    #[tokio::test]
    async fn migrates_tables_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        make_source(
            dir.path(),
            "shop",
            "CREATE TABLE items (id INTEGER, name TEXT);
             INSERT INTO items VALUES (1, 'hat'), (2, 'cup');",
        );

        let outcome = migrate_one("shop", dir.path(), &sqlite_cfg(dir.path()))
            .await
            .unwrap();
        assert_eq!(outcome.tables, 1);
        assert_eq!(outcome.rows_inserted, 2);
        assert_eq!(outcome.rows_skipped, 0);

        let target = Connection::open(dir.path().join("target.db")).unwrap();
        let count: i64 = target
            .query_row("SELECT count(*) FROM SHOP_ITEMS", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn re_migration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        make_source(
            dir.path(),
            "shop",
            "CREATE TABLE items (id INTEGER);
             INSERT INTO items VALUES (1), (2), (3);",
        );
        let cfg = sqlite_cfg(dir.path());

        migrate_one("shop", dir.path(), &cfg).await.unwrap();
        let second = migrate_one("shop", dir.path(), &cfg).await.unwrap();
        assert_eq!(second.rows_inserted, 3);

        let target = Connection::open(dir.path().join("target.db")).unwrap();
        let count: i64 = target
            .query_row("SELECT count(*) FROM SHOP_ITEMS", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn missing_source_is_a_migration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = migrate_one("ghost", dir.path(), &sqlite_cfg(dir.path()))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ghost"), "message should name the db: {msg}");
        assert!(msg.contains("failed to migrate"));
    }

    /// Target that rejects every multi-row INSERT and one specific value
    /// row-by-row, exercising the bulk fallback path.
    struct RejectingTarget {
        poison: i64,
    }

    #[async_trait]
    impl engine::TargetClient for RejectingTarget {
        fn engine(&self) -> Engine {
            Engine::Sqlite
        }

        async fn recreate_namespace(&mut self, _ns: &Namespace) -> Result<(), EvalError> {
            Ok(())
        }

        async fn create_table(
            &mut self,
            _ns: &Namespace,
            _schema: &TableSchema,
        ) -> Result<(), EvalError> {
            Ok(())
        }

        async fn insert_rows(
            &mut self,
            _ns: &Namespace,
            _schema: &TableSchema,
            rows: &[Vec<SqlValue>],
        ) -> Result<(), EvalError> {
            if rows.len() > 1 {
                return Err(EvalError::Execution("multi-row insert rejected".into()));
            }
            if matches!(rows[0][0], SqlValue::Integer(i) if i == self.poison) {
                return Err(EvalError::Execution("value constraint violated".into()));
            }
            Ok(())
        }

        async fn execute_query(
            &mut self,
            _ns: &Namespace,
            _sql: &str,
        ) -> Result<QueryPayload, EvalError> {
            Err(EvalError::Execution("not a query target".into()))
        }

        async fn reset(&mut self) -> Result<(), EvalError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn bulk_failure_falls_back_to_rows_and_skips_bad_ones() {
        let schema = TableSchema {
            name: "t".into(),
            columns: vec![ColumnDef {
                name: "x".into(),
                decl_type: "INTEGER".into(),
            }],
        };
        let rows: Vec<Vec<SqlValue>> = (0..5).map(|i| vec![SqlValue::Integer(i)]).collect();
        let mut client = RejectingTarget { poison: 3 };
        let ns = Engine::Sqlite.namespace_for("db");

        let (inserted, skipped) = load_table(&mut client, &ns, &schema, &rows, "db")
            .await
            .unwrap();
        assert_eq!(inserted, 4);
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn unloadable_single_row_is_skipped() {
        let schema = TableSchema {
            name: "t".into(),
            columns: vec![ColumnDef {
                name: "x".into(),
                decl_type: "INTEGER".into(),
            }],
        };
        let rows = vec![vec![SqlValue::Integer(3)]];
        let mut client = RejectingTarget { poison: 3 };
        let ns = Engine::Sqlite.namespace_for("db");

        let (inserted, skipped) = load_table(&mut client, &ns, &schema, &rows, "db")
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn migrate_all_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        make_source(dir.path(), "good", "CREATE TABLE t (x INTEGER);");

        let report = migrate_all(
            vec!["good".into(), "ghost".into()],
            dir.path().to_path_buf(),
            sqlite_cfg(dir.path()),
            2,
        )
        .await
        .unwrap();

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].db_id, "good");
        assert!(report.failed.contains_key("ghost"));
    }
}
