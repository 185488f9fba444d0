// ABOUTME: Bounded worker pool that runs query tasks against the target
// ABOUTME: Per-task timeouts, fault isolation, deterministic ordering

use crate::batch::{ExecutionOutcome, QueryTask};
use crate::config::TargetConfig;
use crate::engine::{self, TargetClient};
use crate::error::EvalError;
use crate::migrate::MigrationReport;
use crate::rewrite::qualify_tables;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

/// Extra slack on top of the engine-side timeout. The engine is expected
/// to cancel the statement itself; this backstop only fires when a
/// driver call wedges entirely, and it costs the worker a reconnect.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Run every task in the batch and return outcomes sorted by index.
/// Tasks whose database failed migration are short-circuited to errors
/// without touching the target.
pub async fn execute_batch(
    tasks: Vec<QueryTask>,
    cfg: &TargetConfig,
    workers: usize,
    migration: &MigrationReport,
) -> Result<Vec<ExecutionOutcome>> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    let mut runnable = VecDeque::new();
    for task in tasks {
        match migration.failed.get(&task.db_id) {
            Some(reason) => outcomes.push(ExecutionOutcome::failure(
                task.index,
                &EvalError::migration(&task.db_id, reason.clone()),
                Duration::ZERO,
            )),
            None => runnable.push_back(task),
        }
    }

    let total = runnable.len();
    let workers = workers.max(1).min(total.max(1));

    // Connect every worker up front so an unreachable target fails the
    // run immediately instead of producing a batch of connection errors.
    let mut clients = Vec::with_capacity(workers);
    for _ in 0..workers {
        let client = engine::connect(cfg)
            .await
            .context("cannot reach target engine")?;
        clients.push(client);
    }

    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("Executing queries [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("##-"),
    );

    let queue = Arc::new(Mutex::new(runnable));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let timeout_secs = cfg.timeout_secs;

    let mut handles = Vec::with_capacity(workers);
    for client in clients {
        let queue = queue.clone();
        let tx = tx.clone();
        let progress = progress.clone();
        handles.push(tokio::spawn(worker_loop(
            client,
            timeout_secs,
            queue,
            tx,
            progress,
        )));
    }
    drop(tx);

    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }
    for handle in handles {
        // Worker panics surface here; the queue items they held are
        // accounted for by the missing-index sweep below.
        let _ = handle.await;
    }
    progress.finish_and_clear();

    outcomes.sort_by_key(|o| o.index);
    Ok(outcomes)
}

async fn worker_loop(
    mut client: Box<dyn TargetClient>,
    timeout_secs: u64,
    queue: Arc<Mutex<VecDeque<QueryTask>>>,
    tx: mpsc::UnboundedSender<ExecutionOutcome>,
    progress: ProgressBar,
) {
    loop {
        let task = {
            let mut q = queue.lock().await;
            match q.pop_front() {
                Some(t) => t,
                None => break,
            }
        };
        let outcome = run_task(client.as_mut(), timeout_secs, &task).await;
        progress.inc(1);
        if tx.send(outcome).is_err() {
            break;
        }
    }
}

async fn run_task(
    client: &mut dyn TargetClient,
    timeout_secs: u64,
    task: &QueryTask,
) -> ExecutionOutcome {
    let engine = client.engine();
    let ns = engine.namespace_for(&task.db_id);
    let sql = qualify_tables(&task.sql, &task.db_id, engine);
    let started = Instant::now();
    let deadline = Duration::from_secs(timeout_secs) + TIMEOUT_GRACE;

    match tokio::time::timeout(deadline, client.execute_query(&ns, &sql)).await {
        Ok(Ok(payload)) => ExecutionOutcome::success(task.index, payload, started.elapsed()),
        Ok(Err(e)) => ExecutionOutcome::failure(task.index, &e, started.elapsed()),
        Err(_) => {
            // The engine-side timeout never fired; drop the wedged
            // connection so the worker can keep serving the queue.
            tracing::warn!(
                "query {} exceeded the grace deadline; resetting connection",
                task.index
            );
            if let Err(e) = client.reset().await {
                tracing::warn!("connection reset failed: {}", e);
            }
            ExecutionOutcome::failure(task.index, &EvalError::Timeout(timeout_secs), started.elapsed())
        }
    }
}

/// Guarantee one outcome per input index. Any index lost to a worker
/// panic gets a synthesized error so the output file stays aligned
/// with the batch.
pub fn fill_missing(outcomes: &mut Vec<ExecutionOutcome>, expected: &[i64]) {
    for &index in expected {
        if outcomes.iter().all(|o| o.index != index) {
            outcomes.push(ExecutionOutcome::failure(
                index,
                &EvalError::Execution("query produced no result".to_string()),
                Duration::ZERO,
            ));
        }
    }
    outcomes.sort_by_key(|o| o.index);
}
