// ABOUTME: Target-engine abstraction: dialect rules and the TargetClient trait
// ABOUTME: One conforming client per engine shares the migrator and executor

pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod typemap;

use crate::batch::QueryPayload;
use crate::config::TargetConfig;
use crate::error::EvalError;
use crate::source::TableSchema;
use crate::value::SqlValue;
use async_trait::async_trait;

/// Supported target engines.
///
/// Together these cover the three namespacing styles a target can offer:
/// a schema per source database (Postgres), a database per source database
/// (MySQL), and a table-name prefix inside one shared store (SQLite).
#[derive(clap::ValueEnum, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgres,
    Mysql,
    Sqlite,
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Postgres => write!(f, "postgres"),
            Engine::Mysql => write!(f, "mysql"),
            Engine::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// The isolation boundary keeping one source database's tables from
/// colliding with another's inside a shared target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    /// A schema inside one target database (Postgres).
    Schema(String),
    /// A whole database, selected per query with USE (MySQL).
    Database(String),
    /// A `DBID_` prefix on every table name (shared SQLite file).
    TablePrefix(String),
}

impl Namespace {
    pub fn key(&self) -> &str {
        match self {
            Namespace::Schema(s) | Namespace::Database(s) | Namespace::TablePrefix(s) => s,
        }
    }
}

impl Engine {
    /// Namespace for one source database, following the engine's identifier
    /// conventions: Postgres folds to lowercase, MySQL keeps the id as-is,
    /// the prefix style folds to uppercase.
    pub fn namespace_for(&self, db_id: &str) -> Namespace {
        match self {
            Engine::Postgres => Namespace::Schema(db_id.to_lowercase()),
            Engine::Mysql => Namespace::Database(db_id.to_string()),
            Engine::Sqlite => Namespace::TablePrefix(db_id.to_uppercase()),
        }
    }

    /// Apply the engine's identifier case rule.
    pub fn normalize_ident(&self, ident: &str) -> String {
        match self {
            Engine::Postgres => ident.to_lowercase(),
            Engine::Mysql => ident.to_string(),
            Engine::Sqlite => ident.to_uppercase(),
        }
    }

    /// Quote an identifier (with the case rule applied).
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Engine::Postgres | Engine::Sqlite => format!("\"{}\"", self.normalize_ident(ident)),
            Engine::Mysql => format!("`{}`", ident),
        }
    }

    /// Fully qualified, quoted name of a migrated table.
    pub fn qualified_table(&self, ns: &Namespace, table: &str) -> String {
        match ns {
            Namespace::Schema(schema) => format!("\"{}\".\"{}\"", schema, table.to_lowercase()),
            Namespace::Database(db) => format!("`{}`.`{}`", db, table),
            Namespace::TablePrefix(prefix) => {
                format!("\"{}_{}\"", prefix, table.to_uppercase())
            }
        }
    }
}

/// Build the CREATE TABLE statement for one migrated table.
pub fn create_table_sql(engine: Engine, ns: &Namespace, schema: &TableSchema) -> String {
    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|col| {
            format!(
                "{} {}",
                engine.quote_ident(&col.name),
                typemap::map_type(&col.decl_type, engine)
            )
        })
        .collect();
    let suffix = match engine {
        Engine::Mysql => " ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        Engine::Postgres | Engine::Sqlite => "",
    };
    format!(
        "CREATE TABLE {} ({}){}",
        engine.qualified_table(ns, &schema.name),
        columns.join(", "),
        suffix
    )
}

/// Build a multi-row INSERT statement with rendered literals.
pub fn insert_sql(
    engine: Engine,
    ns: &Namespace,
    schema: &TableSchema,
    rows: &[Vec<SqlValue>],
) -> String {
    let columns: Vec<String> = schema
        .columns
        .iter()
        .map(|col| engine.quote_ident(&col.name))
        .collect();
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let fields: Vec<String> = row.iter().map(|v| v.sql_literal(engine)).collect();
            format!("({})", fields.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        engine.qualified_table(ns, &schema.name),
        columns.join(", "),
        tuples.join(", ")
    )
}

/// One connection to a target engine.
///
/// The migrator and the executor both speak this trait; each concurrent
/// task owns its client exclusively, since none of the underlying client
/// libraries are safe for concurrent use on one connection.
#[async_trait]
pub trait TargetClient: Send {
    fn engine(&self) -> Engine;

    /// Drop and recreate the namespace for one source database
    /// (clean-slate guarantee; idempotent under re-invocation).
    async fn recreate_namespace(&mut self, ns: &Namespace) -> Result<(), EvalError>;

    async fn create_table(&mut self, ns: &Namespace, schema: &TableSchema)
        -> Result<(), EvalError>;

    async fn insert_rows(
        &mut self,
        ns: &Namespace,
        schema: &TableSchema,
        rows: &[Vec<SqlValue>],
    ) -> Result<(), EvalError>;

    /// Run one already-rewritten query under the configured time budget.
    async fn execute_query(&mut self, ns: &Namespace, sql: &str)
        -> Result<QueryPayload, EvalError>;

    /// Tear down and re-establish the connection after a wedged query.
    async fn reset(&mut self) -> Result<(), EvalError>;
}

/// Open one client for the configured target.
pub async fn connect(cfg: &TargetConfig) -> Result<Box<dyn TargetClient>, EvalError> {
    match cfg.engine {
        Engine::Postgres => Ok(Box::new(postgres::PostgresTarget::connect(cfg).await?)),
        Engine::Mysql => Ok(Box::new(mysql::MysqlTarget::connect(cfg).await?)),
        Engine::Sqlite => Ok(Box::new(sqlite::SqliteTarget::connect(cfg).await?)),
    }
}
