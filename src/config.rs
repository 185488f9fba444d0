// ABOUTME: Explicit run configuration for the migrator and the executor
// ABOUTME: Merges CLI flags with an optional TOML file; no ambient state

use crate::engine::Engine;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Connection and time-budget settings for one target engine.
///
/// Passed explicitly into every migration and execution call; there is no
/// global client state.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub engine: Engine,
    /// Connection string for postgres/mysql, or the target file path for
    /// the shared sqlite store.
    pub url: String,
    /// Per-task execution time budget.
    pub timeout_secs: u64,
    /// Retries (with backoff) when connecting to a server-backed engine.
    /// The embedded sqlite store opens a local file and never retries.
    pub connect_retries: u32,
}

impl TargetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fully resolved settings for a `run` invocation.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub target: TargetConfig,
    pub workers: usize,
}

/// Shape of the optional `[target]` TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub engine: Option<Engine>,
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub workers: Option<usize>,
}

pub fn load_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
}

/// Merge CLI flags over the optional config file. CLI values win.
pub fn resolve(
    config_path: Option<&Path>,
    engine: Option<Engine>,
    url: Option<String>,
    timeout_secs: Option<u64>,
    workers: Option<usize>,
) -> Result<RunSettings> {
    let file = match config_path {
        Some(path) => load_file(path)?,
        None => FileConfig::default(),
    };

    let engine = engine
        .or(file.engine)
        .context("No target engine specified (use --engine or a config file)")?;
    let url = url
        .or(file.url)
        .context("No target url specified (use --url or a config file)")?;

    Ok(RunSettings {
        target: TargetConfig {
            engine,
            url,
            timeout_secs: timeout_secs
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            connect_retries: DEFAULT_CONNECT_RETRIES,
        },
        workers: workers.or(file.workers).unwrap_or_else(default_workers),
    })
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(4)
}
