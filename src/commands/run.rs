// ABOUTME: The run subcommand: migrate every referenced database into the
// ABOUTME: target, execute the batch, write one result line per query

use crate::batch::{self, OutcomeStatus};
use crate::config::RunSettings;
use crate::executor;
use crate::migrate;
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;

pub async fn run(
    input: &Path,
    db_dir: &Path,
    output: &Path,
    settings: RunSettings,
) -> Result<()> {
    let tasks = batch::read_batch_file(input)?;
    if tasks.is_empty() {
        tracing::warn!("{}: no queries found", input.display());
        batch::write_result_file(output, &[])?;
        return Ok(());
    }
    let expected: Vec<i64> = tasks.iter().map(|t| t.index).collect();

    let db_ids: BTreeSet<String> = tasks.iter().map(|t| t.db_id.clone()).collect();
    tracing::info!(
        "{} queries across {} database(s), target engine {}",
        tasks.len(),
        db_ids.len(),
        settings.target.engine
    );

    let report = migrate::migrate_all(
        db_ids.into_iter().collect(),
        db_dir.to_path_buf(),
        settings.target.clone(),
        settings.workers,
    )
    .await?;

    let mut outcomes =
        executor::execute_batch(tasks, &settings.target, settings.workers, &report).await?;
    executor::fill_missing(&mut outcomes, &expected);
    batch::write_result_file(output, &outcomes)?;

    let succeeded = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Success)
        .count();
    let timed_out = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Timeout)
        .count();
    tracing::info!(
        "wrote {}: {} succeeded, {} failed ({} timed out)",
        output.display(),
        succeeded,
        outcomes.len() - succeeded,
        timed_out
    );
    Ok(())
}
