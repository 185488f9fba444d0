// ABOUTME: Read-only access to a single-file source database
// ABOUTME: Introspects tables and columns and snapshots full table contents

use crate::error::EvalError;
use crate::value::SqlValue;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type text, e.g. `INTEGER` or `VARCHAR(40)`. May be empty.
    pub decl_type: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

/// Conventional on-disk layout: `db_dir/<db_id>/<db_id>.sqlite`.
pub fn source_path(db_dir: &Path, db_id: &str) -> PathBuf {
    db_dir.join(db_id).join(format!("{db_id}.sqlite"))
}

/// One source database, opened read-only. Immutable once read.
#[derive(Debug)]
pub struct SourceDatabase {
    conn: Connection,
}

impl SourceDatabase {
    pub fn open(path: &Path) -> Result<Self, EvalError> {
        if !path.is_file() {
            return Err(EvalError::Connection(format!(
                "source database file not found: {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// User tables, excluding SQLite's internal `sqlite_*` objects.
    pub fn table_names(&self) -> Result<Vec<String>, EvalError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn table_schema(&self, table: &str) -> Result<TableSchema, EvalError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quoted(table)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnDef {
                    name: row.get(1)?,
                    decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(TableSchema {
            name: table.to_string(),
            columns,
        })
    }

    /// Bulk-read every row of one table.
    pub fn read_rows(&self, table: &str) -> Result<Vec<Vec<SqlValue>>, EvalError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {}", quoted(table)))?;
        let column_count = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                let mut fields = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    fields.push(SqlValue::from(row.get_ref(i)?));
                }
                Ok(fields)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Snapshot every table's schema and contents in one pass. Tables
    /// without columns (e.g. half-created virtual tables) are skipped.
    pub fn snapshot(&self) -> Result<Vec<(TableSchema, Vec<Vec<SqlValue>>)>, EvalError> {
        let mut out = Vec::new();
        for table in self.table_names()? {
            let schema = self.table_schema(&table)?;
            if schema.columns.is_empty() {
                tracing::warn!("skipping table '{}': no columns", table);
                continue;
            }
            let rows = self.read_rows(&table)?;
            out.push((schema, rows));
        }
        Ok(out)
    }
}

fn quoted(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
