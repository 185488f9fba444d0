// ABOUTME: Integration tests against real postgres/mysql servers
// ABOUTME: Ignored by default; run with TEST_PG_URL / TEST_MYSQL_URL set

use rusqlite::Connection;
use sql_exec_eval::batch::QueryTask;
use sql_exec_eval::config::TargetConfig;
use sql_exec_eval::engine::Engine;
use sql_exec_eval::executor;
use sql_exec_eval::migrate;
use std::env;
use std::path::Path;

fn make_source(db_dir: &Path, db_id: &str, ddl: &str) {
    let dir = db_dir.join(db_id);
    std::fs::create_dir_all(&dir).unwrap();
    let conn = Connection::open(dir.join(format!("{db_id}.sqlite"))).unwrap();
    conn.execute_batch(ddl).unwrap();
}

fn remote_cfg(var: &str, engine: Engine) -> TargetConfig {
    let url = env::var(var).unwrap_or_else(|_| panic!("{var} must be set"));
    TargetConfig {
        engine,
        url,
        timeout_secs: 10,
        connect_retries: 1,
    }
}

async fn migrate_and_query(cfg: TargetConfig) {
    let dir = tempfile::tempdir().unwrap();
    make_source(
        dir.path(),
        "remote_eval_smoke",
        "CREATE TABLE things (id INTEGER, label TEXT, weight REAL);
         INSERT INTO things VALUES (1, 'one', 1.5), (2, 'two', NULL);",
    );

    let report = migrate::migrate_all(
        vec!["remote_eval_smoke".into()],
        dir.path().to_path_buf(),
        cfg.clone(),
        1,
    )
    .await
    .unwrap();
    assert!(
        report.failed.is_empty(),
        "migration failed: {:?}",
        report.failed
    );

    let tasks = vec![QueryTask {
        index: 0,
        sql: "SELECT id, label FROM things ORDER BY id".to_string(),
        db_id: "remote_eval_smoke".to_string(),
    }];
    let outcomes = executor::execute_batch(tasks, &cfg, 1, &report)
        .await
        .unwrap();
    assert_eq!(outcomes[0].render(), "[(1, 'one'), (2, 'two')]");
}

#[tokio::test]
#[ignore]
async fn test_postgres_migrate_and_execute() {
    migrate_and_query(remote_cfg("TEST_PG_URL", Engine::Postgres)).await;
}

#[tokio::test]
#[ignore]
async fn test_mysql_migrate_and_execute() {
    migrate_and_query(remote_cfg("TEST_MYSQL_URL", Engine::Mysql)).await;
}

#[tokio::test]
#[ignore]
async fn test_postgres_native_timeout() {
    let cfg = TargetConfig {
        timeout_secs: 1,
        ..remote_cfg("TEST_PG_URL", Engine::Postgres)
    };
    let dir = tempfile::tempdir().unwrap();
    make_source(dir.path(), "remote_eval_smoke", "CREATE TABLE t (x INTEGER);");

    let report = migrate::migrate_all(
        vec!["remote_eval_smoke".into()],
        dir.path().to_path_buf(),
        cfg.clone(),
        1,
    )
    .await
    .unwrap();

    let tasks = vec![QueryTask {
        index: 0,
        sql: "SELECT pg_sleep(5)".to_string(),
        db_id: "remote_eval_smoke".to_string(),
    }];
    let outcomes = executor::execute_batch(tasks, &cfg, 1, &report)
        .await
        .unwrap();
    assert_eq!(outcomes[0].render(), "Error: Query timed out after 1 seconds.");
}
