// ABOUTME: Batch input parsing and result-file serialization
// ABOUTME: One tab-separated line per query task, one line per outcome

use crate::error::EvalError;
use crate::utils::flatten_message;
use crate::value::{rows_literal, SqlValue};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

/// Fixed text written for statements that do not return rows.
pub const STATEMENT_MARKER: &str = "Query executed successfully (no rows returned).";

/// One immutable input unit: `index<TAB>sql<TAB>db_id`.
#[derive(Debug, Clone)]
pub struct QueryTask {
    pub index: i64,
    pub sql: String,
    pub db_id: String,
}

/// What a successful execution produced.
#[derive(Debug, Clone)]
pub enum QueryPayload {
    Rows(Vec<Vec<SqlValue>>),
    /// The statement ran but returned no result set.
    Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Error,
    Timeout,
}

/// Exactly one outcome per task, produced whatever happens.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub index: i64,
    pub status: OutcomeStatus,
    pub payload: Option<QueryPayload>,
    pub message: Option<String>,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn success(index: i64, payload: QueryPayload, duration: Duration) -> Self {
        Self {
            index,
            status: OutcomeStatus::Success,
            payload: Some(payload),
            message: None,
            duration,
        }
    }

    pub fn failure(index: i64, err: &EvalError, duration: Duration) -> Self {
        let status = if err.is_timeout() {
            OutcomeStatus::Timeout
        } else {
            OutcomeStatus::Error
        };
        Self {
            index,
            status,
            payload: None,
            message: Some(err.to_string()),
            duration,
        }
    }

    /// The `result_or_error` field of the output line.
    pub fn render(&self) -> String {
        match (&self.status, &self.payload) {
            (OutcomeStatus::Success, Some(QueryPayload::Rows(rows))) => rows_literal(rows),
            (OutcomeStatus::Success, _) => STATEMENT_MARKER.to_string(),
            _ => {
                let msg = self.message.as_deref().unwrap_or("unknown failure");
                format!("Error: {}", flatten_message(msg))
            }
        }
    }
}

/// Parse a batch file of `index<TAB>sql<TAB>db_id` lines.
///
/// Malformed lines are warned about and skipped, never fatal; multi-line
/// SQL must already have been merged upstream.
pub fn read_batch_file(path: &Path) -> Result<Vec<QueryTask>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;

    let mut tasks = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != 3 {
            tracing::warn!(
                "line {}: expected 3 tab-separated fields, got {}; skipping",
                line_no + 1,
                parts.len()
            );
            continue;
        }
        let index = match parts[0].trim().parse::<i64>() {
            Ok(index) => index,
            Err(_) => {
                tracing::warn!("line {}: non-numeric index '{}'; skipping", line_no + 1, parts[0]);
                continue;
            }
        };
        tasks.push(QueryTask {
            index,
            sql: parts[1].trim().to_string(),
            db_id: parts[2].trim().to_string(),
        });
    }
    Ok(tasks)
}

/// Write one line per outcome, ordered as given (callers sort by index).
pub fn write_result_file(path: &Path, outcomes: &[ExecutionOutcome]) -> Result<()> {
    let mut out = String::new();
    for outcome in outcomes {
        out.push_str(&format!("{}\t{}\n", outcome.index, outcome.render()));
    }
    std::fs::write(path, out)
        .with_context(|| format!("Failed to write result file {}", path.display()))
}
