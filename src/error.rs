// ABOUTME: Error taxonomy for migration, execution, and scoring
// ABOUTME: Task-level failures are recorded per query and never abort a batch

use thiserror::Error;

/// Main error type for the evaluation pipeline.
///
/// Only `Connection` errors raised while establishing the initial worker
/// connections are fatal to a run; everything else is captured into a
/// per-task outcome.
#[derive(Error, Debug)]
pub enum EvalError {
    /// The whole migration for one source database failed. Every query
    /// against that db_id short-circuits to an error outcome.
    #[error("Database '{db_id}' failed to migrate: {message}")]
    Migration { db_id: String, message: String },

    /// A query failed against a successfully migrated namespace. The
    /// backend message is preserved verbatim for debuggability.
    #[error("{0}")]
    Execution(String),

    /// A query exceeded its per-task time budget.
    #[error("Query timed out after {0} seconds.")]
    Timeout(u64),

    /// Could not establish or re-establish a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// SQLite error from either the source store or the sqlite target.
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    pub fn migration(db_id: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::Migration {
            db_id: db_id.into(),
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EvalError::Timeout(_))
    }
}
