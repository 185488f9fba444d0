// ABOUTME: The score subcommand: compares a prediction result file against
// ABOUTME: gold and appends the accuracy to a running score log

use crate::score::score_files;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub fn run(gold: &Path, pred: &Path, log: &Path) -> Result<()> {
    let report = score_files(gold, pred)?;

    let basename = pred
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pred.display().to_string());
    let entry = format!(
        "- {}\n  exec_score: {:.4} ({} / {})\n",
        basename,
        report.accuracy(),
        report.matched,
        report.total
    );

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .with_context(|| format!("failed to open score log {}", log.display()))?;
    file.write_all(entry.as_bytes())
        .with_context(|| format!("failed to append to {}", log.display()))?;

    println!(
        "exec_score: {:.4} ({} / {})",
        report.accuracy(),
        report.matched,
        report.total
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_to_score_log() {
        let dir = tempfile::tempdir().unwrap();
        let gold = dir.path().join("gold.txt");
        let pred = dir.path().join("model_a.txt");
        let log = dir.path().join("eval_score.txt");
        std::fs::write(&gold, "0\t[(1,)]\n").unwrap();
        std::fs::write(&pred, "0\t[(1,)]\n").unwrap();

        run(&gold, &pred, &log).unwrap();
        run(&gold, &pred, &log).unwrap();

        let content = std::fs::read_to_string(&log).unwrap();
        let expected = "- model_a.txt\n  exec_score: 1.0000 (1 / 1)\n";
        assert_eq!(content, format!("{expected}{expected}"));
    }
}
