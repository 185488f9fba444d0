// ABOUTME: MySQL target: database-per-source namespaces via mysql_async
// ABOUTME: Queries are routed with USE; native max_execution_time timeouts

use super::{create_table_sql, insert_sql, Engine, Namespace, TargetClient};
use crate::batch::QueryPayload;
use crate::config::TargetConfig;
use crate::error::EvalError;
use crate::source::TableSchema;
use crate::utils;
use crate::value::SqlValue;
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Value};
use std::time::Duration;

#[derive(Debug)]
pub struct MysqlTarget {
    conn: Conn,
    opts: Opts,
    timeout_secs: u64,
}

impl MysqlTarget {
    pub async fn connect(cfg: &TargetConfig) -> Result<Self, EvalError> {
        let opts = Opts::from_url(&cfg.url)
            .map_err(|e| EvalError::Connection(format!("invalid mysql url: {e}")))?;
        let conn = connect_conn(&opts, cfg.connect_retries).await?;
        let mut target = Self {
            conn,
            opts,
            timeout_secs: cfg.timeout_secs,
        };
        target.apply_session_timeout().await?;
        Ok(target)
    }

    async fn apply_session_timeout(&mut self) -> Result<(), EvalError> {
        // max_execution_time is in milliseconds and only bounds SELECTs
        self.conn
            .query_drop(format!(
                "SET SESSION max_execution_time = {}",
                self.timeout_secs * 1000
            ))
            .await
            .map_err(|e| EvalError::Connection(e.to_string()))
    }

    fn classify(&self, err: mysql_async::Error) -> EvalError {
        classify(self.timeout_secs, err)
    }
}

fn classify(timeout_secs: u64, err: mysql_async::Error) -> EvalError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("maximum statement execution time")
        || lowered.contains("max_execution_time")
        || lowered.contains("maximum execution time")
    {
        EvalError::Timeout(timeout_secs)
    } else {
        EvalError::Execution(message)
    }
}

#[async_trait]
impl TargetClient for MysqlTarget {
    fn engine(&self) -> Engine {
        Engine::Mysql
    }

    async fn recreate_namespace(&mut self, ns: &Namespace) -> Result<(), EvalError> {
        let Namespace::Database(db) = ns else {
            return Err(EvalError::Execution(
                "mysql target expects a database namespace".into(),
            ));
        };
        self.conn
            .query_drop(format!("DROP DATABASE IF EXISTS `{db}`"))
            .await
            .map_err(|e| self.classify(e))?;
        self.conn
            .query_drop(format!(
                "CREATE DATABASE `{db}` DEFAULT CHARACTER SET utf8mb4"
            ))
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn create_table(
        &mut self,
        ns: &Namespace,
        schema: &TableSchema,
    ) -> Result<(), EvalError> {
        self.conn
            .query_drop(create_table_sql(Engine::Mysql, ns, schema))
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn insert_rows(
        &mut self,
        ns: &Namespace,
        schema: &TableSchema,
        rows: &[Vec<SqlValue>],
    ) -> Result<(), EvalError> {
        self.conn
            .query_drop(insert_sql(Engine::Mysql, ns, schema, rows))
            .await
            .map_err(|e| self.classify(e))?;
        Ok(())
    }

    async fn execute_query(
        &mut self,
        ns: &Namespace,
        sql: &str,
    ) -> Result<QueryPayload, EvalError> {
        // Bare table names resolve against the task's own database
        self.conn
            .query_drop(format!("USE `{}`", ns.key()))
            .await
            .map_err(|e| self.classify(e))?;

        let timeout_secs = self.timeout_secs;
        let mut result = self
            .conn
            .query_iter(sql)
            .await
            .map_err(|e| classify(timeout_secs, e))?;
        let has_result_set = result.columns().is_some();
        let rows: Vec<mysql_async::Row> = result
            .collect()
            .await
            .map_err(|e| classify(timeout_secs, e))?;

        if !has_result_set {
            return Ok(QueryPayload::Statement);
        }
        Ok(QueryPayload::Rows(
            rows.into_iter()
                .map(|row| row.unwrap().into_iter().map(from_mysql).collect())
                .collect(),
        ))
    }

    async fn reset(&mut self) -> Result<(), EvalError> {
        self.conn = connect_conn(&self.opts, 1).await?;
        self.apply_session_timeout().await
    }
}

async fn connect_conn(opts: &Opts, retries: u32) -> Result<Conn, EvalError> {
    utils::retry_with_backoff(
        || {
            let opts = opts.clone();
            async move { Conn::new(opts).await.map_err(anyhow::Error::from) }
        },
        retries,
        Duration::from_secs(1),
    )
    .await
    .map_err(|e| EvalError::Connection(e.to_string()))
}

fn from_mysql(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::Integer(i),
        Value::UInt(u) => SqlValue::Integer(u as i64),
        Value::Float(f) => SqlValue::Real(f64::from(f)),
        Value::Double(d) => SqlValue::Real(d),
        Value::Bytes(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
        Value::Date(y, m, d, h, mi, s, _us) => {
            if h == 0 && mi == 0 && s == 0 {
                SqlValue::Text(format!("{y:04}-{m:02}-{d:02}"))
            } else {
                SqlValue::Text(format!("{y:04}-{m:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
            }
        }
        Value::Time(neg, days, h, mi, s, _us) => {
            let sign = if neg { "-" } else { "" };
            let hours = u32::from(h) + days * 24;
            SqlValue::Text(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
        }
    }
}
