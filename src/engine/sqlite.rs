// ABOUTME: Shared-file SQLite target with prefix-style namespaces
// ABOUTME: No native timeouts: cooperative cancellation via sqlite3_interrupt

use super::{create_table_sql, insert_sql, Engine, Namespace, TargetClient};
use crate::batch::QueryPayload;
use crate::config::TargetConfig;
use crate::error::EvalError;
use crate::source::TableSchema;
use crate::value::SqlValue;
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;

/// Target backed by one shared SQLite file. Every source database maps to
/// an uppercase `DBID_` table-name prefix inside it. Statements run on a
/// blocking thread with their own connection, so a timed-out query can be
/// interrupted and reaped without poisoning the worker.
pub struct SqliteTarget {
    path: PathBuf,
    timeout: Duration,
    timeout_secs: u64,
}

impl SqliteTarget {
    pub async fn connect(cfg: &TargetConfig) -> Result<Self, EvalError> {
        let target = Self {
            path: PathBuf::from(&cfg.url),
            timeout: cfg.timeout(),
            timeout_secs: cfg.timeout_secs,
        };
        // Surface path/permission problems before any work is queued
        target.with_conn(|_| Ok(())).await?;
        Ok(target)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, EvalError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, EvalError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_target(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| EvalError::Execution(format!("sqlite task failed: {e}")))?
    }
}

#[async_trait]
impl TargetClient for SqliteTarget {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn recreate_namespace(&mut self, ns: &Namespace) -> Result<(), EvalError> {
        let Namespace::TablePrefix(prefix) = ns else {
            return Err(EvalError::Execution(
                "sqlite target expects a table-prefix namespace".into(),
            ));
        };
        let prefix = prefix.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name LIKE ?1 ESCAPE '\\'",
            )?;
            let pattern = format!("{}\\_%", prefix.replace('_', "\\_"));
            let tables = stmt
                .query_map([pattern], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for table in tables {
                conn.execute_batch(&format!("DROP TABLE \"{}\"", table.replace('"', "\"\"")))?;
            }
            Ok(())
        })
        .await
    }

    async fn create_table(
        &mut self,
        ns: &Namespace,
        schema: &TableSchema,
    ) -> Result<(), EvalError> {
        let sql = create_table_sql(Engine::Sqlite, ns, schema);
        self.with_conn(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    async fn insert_rows(
        &mut self,
        ns: &Namespace,
        schema: &TableSchema,
        rows: &[Vec<SqlValue>],
    ) -> Result<(), EvalError> {
        let sql = insert_sql(Engine::Sqlite, ns, schema, rows);
        self.with_conn(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    async fn execute_query(
        &mut self,
        _ns: &Namespace,
        sql: &str,
    ) -> Result<QueryPayload, EvalError> {
        let path = self.path.clone();
        let sql = sql.to_string();
        let (handle_tx, handle_rx) = oneshot::channel();

        let mut task = tokio::task::spawn_blocking(move || -> Result<QueryPayload, EvalError> {
            let conn = open_target(&path)?;
            let _ = handle_tx.send(conn.get_interrupt_handle());
            run_query(&conn, &sql)
        });
        let interrupt = handle_rx.await.ok();

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => {
                joined.map_err(|e| EvalError::Execution(format!("sqlite task failed: {e}")))?
            }
            Err(_) => {
                if let Some(handle) = interrupt {
                    handle.interrupt();
                }
                // Reap the interrupted task so its connection is torn down
                // before the worker takes another query.
                let _ = task.await;
                Err(EvalError::Timeout(self.timeout_secs))
            }
        }
    }

    async fn reset(&mut self) -> Result<(), EvalError> {
        // Connections are per-statement; nothing persistent to rebuild.
        Ok(())
    }
}

fn open_target(path: &Path) -> Result<Connection, EvalError> {
    let conn =
        Connection::open(path).map_err(|e| EvalError::Connection(e.to_string()))?;
    conn.busy_timeout(Duration::from_secs(30))?;
    // WAL lets execution-phase readers proceed while a migration writer
    // for another db_id is still committing.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

fn run_query(conn: &Connection, sql: &str) -> Result<QueryPayload, EvalError> {
    let mut stmt = conn.prepare(sql)?;
    let column_count = stmt.column_count();
    if column_count == 0 {
        stmt.execute([])?;
        return Ok(QueryPayload::Statement);
    }
    let mut query_rows = stmt.query([])?;
    let mut rows = Vec::new();
    while let Some(row) = query_rows.next()? {
        let mut fields = Vec::with_capacity(column_count);
        for i in 0..column_count {
            fields.push(SqlValue::from(row.get_ref(i)?));
        }
        rows.push(fields);
    }
    Ok(QueryPayload::Rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dir: &Path, timeout_secs: u64) -> SqliteTarget {
        SqliteTarget {
            path: dir.join("target.db"),
            timeout: Duration::from_secs(timeout_secs),
            timeout_secs,
        }
    }

    fn schema() -> TableSchema {
        use crate::source::ColumnDef;
        TableSchema {
            name: "t".into(),
            columns: vec![ColumnDef {
                name: "x".into(),
                decl_type: "INTEGER".into(),
            }],
        }
    }

    #[tokio::test]
    async fn namespace_recreation_is_clean_slate() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = target(dir.path(), 5);
        let ns = Engine::Sqlite.namespace_for("bench");

        target.recreate_namespace(&ns).await.unwrap();
        target.create_table(&ns, &schema()).await.unwrap();
        target
            .insert_rows(&ns, &schema(), &[vec![SqlValue::Integer(1)]])
            .await
            .unwrap();

        // Re-migration starts from scratch: same DDL succeeds again and
        // the old rows are gone.
        target.recreate_namespace(&ns).await.unwrap();
        target.create_table(&ns, &schema()).await.unwrap();

        let rows = match target
            .execute_query(&ns, "SELECT count(*) FROM \"BENCH_T\"")
            .await
            .unwrap()
        {
            QueryPayload::Rows(rows) => rows,
            _ => panic!("expected rows"),
        };
        assert_eq!(rows, vec![vec![SqlValue::Integer(0)]]);
    }

    #[tokio::test]
    async fn sibling_namespace_survives_re_migration() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = target(dir.path(), 5);
        let ns_a = Engine::Sqlite.namespace_for("alpha");
        let ns_b = Engine::Sqlite.namespace_for("beta");

        for ns in [&ns_a, &ns_b] {
            target.recreate_namespace(ns).await.unwrap();
            target.create_table(ns, &schema()).await.unwrap();
            target
                .insert_rows(ns, &schema(), &[vec![SqlValue::Integer(1)]])
                .await
                .unwrap();
        }

        target.recreate_namespace(&ns_a).await.unwrap();

        let rows = match target
            .execute_query(&ns_b, "SELECT x FROM \"BETA_T\"")
            .await
            .unwrap()
        {
            QueryPayload::Rows(rows) => rows,
            _ => panic!("expected rows"),
        };
        assert_eq!(rows, vec![vec![SqlValue::Integer(1)]]);
    }

    #[tokio::test]
    async fn runaway_query_is_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = target(dir.path(), 1);
        let ns = Engine::Sqlite.namespace_for("x");
        target.recreate_namespace(&ns).await.unwrap();

        let err = target
            .execute_query(
                &ns,
                "WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM c)
                 SELECT count(*) FROM c",
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        // The target stays usable afterwards
        let payload = target.execute_query(&ns, "SELECT 1").await.unwrap();
        assert!(matches!(payload, QueryPayload::Rows(_)));
    }

    #[tokio::test]
    async fn statements_without_rows_return_the_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = target(dir.path(), 5);
        let ns = Engine::Sqlite.namespace_for("m");
        target.recreate_namespace(&ns).await.unwrap();

        let payload = target
            .execute_query(&ns, "CREATE TABLE \"M_NOTE\" (x INTEGER)")
            .await
            .unwrap();
        assert!(matches!(payload, QueryPayload::Statement));
    }
}
